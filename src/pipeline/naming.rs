//! Output file naming for the fetch tool

use std::path::{MAIN_SEPARATOR, Path};

use super::config::NameOrder;
use super::models::CatalogEntry;
use crate::utils::sanitize_filename;

/// Build the fetch tool's output template for an entry
///
/// The directory always ends with the platform separator. Everything except
/// the trailing `%(ext)s` placeholder is escaped, so a literal `%` in a name
/// or path can't be read as a template field.
pub fn output_template(dir: &Path, entry: &CatalogEntry, order: NameOrder) -> String {
    let title = sanitize_filename(&entry.title);
    let artist = sanitize_filename(&entry.artist);

    let stem = match order {
        NameOrder::TitleFirst => format!("{} - {}", title, artist),
        NameOrder::ArtistFirst => format!("{} - {}", artist, title),
    };

    format!(
        "{}{}.%(ext)s",
        escape_template(&dir_with_separator(dir)),
        escape_template(&stem)
    )
}

/// Directory rendered as a string that ends with the platform separator
pub fn dir_with_separator(dir: &Path) -> String {
    let mut dir = dir.to_string_lossy().into_owned();
    if !dir.ends_with(MAIN_SEPARATOR) {
        dir.push(MAIN_SEPARATOR);
    }
    dir
}

fn escape_template(text: &str) -> String {
    text.replace('%', "%%")
}
