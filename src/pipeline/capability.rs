//! Runtime detection of optional external tools
//!
//! Used for the transcoder (ffmpeg), whose presence decides whether the
//! download stage asks for audio conversion, and for locating the fetch
//! tool binary itself.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Outcome of a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub available: bool,
    pub path: Option<PathBuf>,
}

impl Capability {
    pub fn found(path: PathBuf) -> Self {
        Self {
            available: true,
            path: Some(path),
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            path: None,
        }
    }
}

/// Locates a binary by explicit override, PATH and well-known install directories
///
/// The probed result (positive or negative) is cached for the lifetime of the
/// probe, which is owned by a single run.
#[derive(Debug)]
pub struct CapabilityProbe {
    binary: String,
    path_dirs: Option<Vec<PathBuf>>,
    well_known: Vec<PathBuf>,
    cache: OnceLock<Capability>,
}

impl CapabilityProbe {
    /// Probe for `binary` using the process PATH and the platform's usual locations
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            path_dirs: None,
            well_known: well_known_dirs(binary),
            cache: OnceLock::new(),
        }
    }

    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg")
    }

    pub fn yt_dlp() -> Self {
        Self::new("yt-dlp")
    }

    /// Replace both search lists (PATH entries and well-known directories)
    #[cfg(test)]
    pub fn with_search_dirs(mut self, path_dirs: Vec<PathBuf>, well_known: Vec<PathBuf>) -> Self {
        self.path_dirs = Some(path_dirs);
        self.well_known = well_known;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Detect the binary. Never fails: anything unexpected reads as "missing".
    ///
    /// An override that exists wins over everything, including the cache.
    pub fn detect(&self, explicit_override: Option<&Path>) -> Capability {
        if let Some(path) = explicit_override {
            if path.is_file() {
                debug!("Using {} override at {}", self.binary, path.display());
                return Capability::found(path.to_path_buf());
            }
            debug!(
                "Ignoring {} override {}: not a file",
                self.binary,
                path.display()
            );
        }

        self.cache.get_or_init(|| self.probe()).clone()
    }

    fn probe(&self) -> Capability {
        let file_name = executable_name(&self.binary);

        let path_dirs = match &self.path_dirs {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|paths| env::split_paths(&paths).collect())
                .unwrap_or_default(),
        };

        if let Some(found) = find_in(&path_dirs, &file_name) {
            debug!("Found {} on PATH: {}", self.binary, found.display());
            return Capability::found(found);
        }

        if let Some(found) = find_in(&self.well_known, &file_name) {
            debug!("Found {} in install directory: {}", self.binary, found.display());
            return Capability::found(found);
        }

        debug!("{} not found", self.binary);
        Capability::missing()
    }
}

fn executable_name(binary: &str) -> String {
    format!("{}{}", binary, env::consts::EXE_SUFFIX)
}

fn find_in(dirs: &[PathBuf], file_name: &str) -> Option<PathBuf> {
    dirs.iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Install locations checked after PATH
fn well_known_dirs(binary: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(windows) {
        for var in ["ProgramFiles", "ProgramFiles(x86)", "USERPROFILE"] {
            if let Some(root) = env::var_os(var) {
                candidates.push(PathBuf::from(root).join(binary).join("bin"));
            }
        }
    } else if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from("/opt/homebrew/bin"));
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/opt/local/bin"));
    } else {
        candidates.push(PathBuf::from("/usr/bin"));
        candidates.push(PathBuf::from("/usr/local/bin"));
        candidates.push(PathBuf::from("/snap/bin"));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".local").join("bin"));
        }
    }

    // Portable installs next to the working directory or the executable
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(binary).join("bin"));
        candidates.push(cwd);
    }
    if let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(binary).join("bin"));
        candidates.push(exe_dir);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install(dir: &Path, binary: &str) -> PathBuf {
        let path = dir.join(executable_name(binary));
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        path
    }

    #[test]
    fn test_override_wins() {
        let path_dir = TempDir::new().unwrap();
        let custom = TempDir::new().unwrap();
        install(path_dir.path(), "ffmpeg");
        let custom_bin = install(custom.path(), "ffmpeg");

        let probe = CapabilityProbe::new("ffmpeg")
            .with_search_dirs(vec![path_dir.path().to_path_buf()], vec![]);

        let capability = probe.detect(Some(&custom_bin));
        assert_eq!(capability, Capability::found(custom_bin));
    }

    #[test]
    fn test_missing_override_falls_back_to_path() {
        let path_dir = TempDir::new().unwrap();
        let on_path = install(path_dir.path(), "ffmpeg");

        let probe = CapabilityProbe::new("ffmpeg")
            .with_search_dirs(vec![path_dir.path().to_path_buf()], vec![]);

        let capability = probe.detect(Some(Path::new("/definitely/not/here/ffmpeg")));
        assert_eq!(capability, Capability::found(on_path));
    }

    #[test]
    fn test_path_before_well_known() {
        let path_dir = TempDir::new().unwrap();
        let install_dir = TempDir::new().unwrap();
        let on_path = install(path_dir.path(), "ffmpeg");
        install(install_dir.path(), "ffmpeg");

        let probe = CapabilityProbe::new("ffmpeg").with_search_dirs(
            vec![path_dir.path().to_path_buf()],
            vec![install_dir.path().to_path_buf()],
        );

        assert_eq!(probe.detect(None), Capability::found(on_path));
    }

    #[test]
    fn test_well_known_fallback() {
        let empty = TempDir::new().unwrap();
        let install_dir = TempDir::new().unwrap();
        let installed = install(install_dir.path(), "ffmpeg");

        let probe = CapabilityProbe::new("ffmpeg").with_search_dirs(
            vec![empty.path().to_path_buf()],
            vec![install_dir.path().to_path_buf()],
        );

        assert_eq!(probe.detect(None), Capability::found(installed));
    }

    #[test]
    fn test_not_found() {
        let empty = TempDir::new().unwrap();
        let probe = CapabilityProbe::new("ffmpeg")
            .with_search_dirs(vec![empty.path().to_path_buf()], vec![PathBuf::new()]);

        assert_eq!(probe.detect(None), Capability::missing());
    }

    #[test]
    fn test_result_is_cached() {
        let path_dir = TempDir::new().unwrap();
        let probe = CapabilityProbe::new("ffmpeg")
            .with_search_dirs(vec![path_dir.path().to_path_buf()], vec![]);

        assert!(!probe.detect(None).available);

        // Installing afterwards doesn't change the cached answer
        install(path_dir.path(), "ffmpeg");
        assert!(!probe.detect(None).available);
    }

    #[test]
    fn test_directory_is_not_a_binary() {
        let path_dir = TempDir::new().unwrap();
        fs::create_dir(path_dir.path().join(executable_name("ffmpeg"))).unwrap();

        let probe = CapabilityProbe::new("ffmpeg")
            .with_search_dirs(vec![path_dir.path().to_path_buf()], vec![]);

        assert!(!probe.detect(None).available);
    }
}
