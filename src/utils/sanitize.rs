//! Filename sanitization for song titles and artist names

/// Make a title or artist name safe to use as part of a filename
///
/// Characters that are reserved on common filesystems are swapped for
/// lookalike Unicode characters, so "AC/DC" stays readable as "AC⧸DC".
/// Control characters are dropped. Trailing dots are removed because
/// Windows strips them silently. A name with nothing left becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' => '⧸',
            '\\' => '⧹',
            ':' => '꞉',
            '*' => '⁎',
            '?' => '？',
            '"' => '″',
            '<' => '‹',
            '>' => '›',
            '|' => '｜',
            _ => c,
        })
        .collect();

    let trimmed = mapped.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
