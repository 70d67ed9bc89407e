use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, debug_span};

use crate::settings::RecognizerSettings;

use super::Recognition;

/// Classifies a typed word. Runs on the recognizer worker thread.
///
/// Lookup failures are not errors; they resolve to
/// [`Recognition::NotRecognized`].
pub trait CommandResolver: Send + Sync {
    fn resolve(&self, word: &str) -> Recognition;
}

/// Resolves words against the filesystem: current directory (when the
/// platform rule asks for it), then `PATH`, then open associations, then
/// directories.
#[derive(Debug, Clone)]
pub struct PathResolver {
    search_cwd: bool,
    path: Option<OsString>,
    cwd: Option<PathBuf>,
    extensions: Vec<String>,
    associations: HashMap<String, String>,
}

const DEFAULT_PATHEXT: &str = ".com;.exe;.bat;.cmd";

impl PathResolver {
    pub fn from_settings(settings: &RecognizerSettings) -> Self {
        let mut extensions: Vec<String> = settings
            .extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        if extensions.is_empty() && cfg!(windows) {
            let pathext = env::var("PATHEXT").unwrap_or_else(|_| DEFAULT_PATHEXT.to_string());
            extensions = pathext
                .split(';')
                .filter(|e| e.starts_with('.') && e.len() > 1)
                .map(|e| e.to_ascii_lowercase())
                .collect();
        }
        Self {
            search_cwd: needs_current_dir(settings.search_cwd),
            path: env::var_os("PATH"),
            cwd: None,
            extensions,
            associations: settings.associations.clone(),
        }
    }

    /// Replace the `PATH` value captured at construction.
    pub fn with_path(mut self, path: impl Into<OsString>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Resolve relative words against `dir` instead of the process cwd.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_search_cwd(mut self, enabled: bool) -> Self {
        self.search_cwd = enabled;
        self
    }

    /// First executable the word resolves to, if any.
    pub fn find_executable(&self, word: &str) -> Option<PathBuf> {
        if has_separator(word) {
            return self.try_location(&self.absolute(word));
        }

        if self.search_cwd {
            if let Some(found) = self.try_location(&self.absolute(word)) {
                return Some(found);
            }
        }

        let path = self.path.as_ref()?;
        env::split_paths(path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .find_map(|dir| self.try_location(&dir.join(word)))
    }

    /// Open command registered for the word's extension, when the word names
    /// an existing file.
    pub fn open_association(&self, word: &str) -> Option<&str> {
        let ext = Path::new(word).extension()?.to_str()?.to_ascii_lowercase();
        let command = self.associations.get(&ext)?;
        self.absolute(word).is_file().then_some(command.as_str())
    }

    fn try_location(&self, base: &Path) -> Option<PathBuf> {
        let name = base.file_name()?.to_string_lossy().to_ascii_lowercase();
        let has_ext = self.extensions.iter().any(|e| name.ends_with(e.as_str()));

        if (has_ext || !cfg!(windows)) && is_executable(base) {
            return Some(base.to_path_buf());
        }
        if has_ext {
            return None;
        }
        self.extensions.iter().find_map(|ext| {
            let mut candidate = base.as_os_str().to_owned();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            is_executable(&candidate).then_some(candidate)
        })
    }

    fn absolute(&self, word: &str) -> PathBuf {
        let p = Path::new(word);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        match &self.cwd {
            Some(cwd) => cwd.join(p),
            None => env::current_dir().unwrap_or_default().join(p),
        }
    }
}

impl CommandResolver for PathResolver {
    fn resolve(&self, word: &str) -> Recognition {
        let _span = debug_span!("resolve", word).entered();
        if word.is_empty() {
            return Recognition::NotRecognized;
        }

        let result = if let Some(found) = self.find_executable(word) {
            debug!(path = %found.display(), "executable");
            Recognition::Recognized
        } else if let Some(command) = self.open_association(word) {
            debug!(command, "open association");
            Recognition::Recognized
        } else if self.absolute(word).is_dir() {
            Recognition::Directory
        } else {
            Recognition::NotRecognized
        };
        debug!(?result);
        result
    }
}

/// Whether the current directory is searched before `PATH` for bare words.
fn needs_current_dir(search_cwd: bool) -> bool {
    if cfg!(windows) {
        env::var_os("NoDefaultCurrentDirectoryInExePath").is_none()
    } else {
        search_cwd
    }
}

fn has_separator(word: &str) -> bool {
    if cfg!(windows) {
        word.contains(['/', '\\', ':'])
    } else {
        word.contains('/')
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::settings::parse_settings_toml;
    use crate::settings::DEFAULT_SETTINGS_TOML;

    fn settings() -> RecognizerSettings {
        let toml = DEFAULT_SETTINGS_TOML.replace(
            "[recognizer.associations]\n",
            "[recognizer.associations]\ntxt = \"xdg-open\"\n",
        );
        parse_settings_toml(&toml).unwrap().recognizer
    }

    fn make_executable(path: &Path) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn finds_executable_on_path() {
        let bin = tempfile::tempdir().unwrap();
        make_executable(&bin.path().join("mytool"));
        let cwd = tempfile::tempdir().unwrap();

        let resolver = PathResolver::from_settings(&settings())
            .with_path(bin.path())
            .with_cwd(cwd.path());
        assert_eq!(resolver.resolve("mytool"), Recognition::Recognized);
        assert_eq!(resolver.resolve("othertool"), Recognition::NotRecognized);
    }

    #[test]
    fn non_executable_file_is_not_recognized() {
        let bin = tempfile::tempdir().unwrap();
        let plain = bin.path().join("notes");
        fs::write(&plain, "x").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();

        let resolver = PathResolver::from_settings(&settings())
            .with_path(bin.path())
            .with_cwd(bin.path());
        assert_eq!(resolver.resolve("notes"), Recognition::NotRecognized);
    }

    #[test]
    fn cwd_searched_only_when_enabled() {
        let cwd = tempfile::tempdir().unwrap();
        make_executable(&cwd.path().join("local"));
        let empty = tempfile::tempdir().unwrap();

        let resolver = PathResolver::from_settings(&settings())
            .with_path(empty.path())
            .with_cwd(cwd.path());
        assert_eq!(resolver.resolve("local"), Recognition::NotRecognized);
        assert_eq!(resolver.resolve("./local"), Recognition::Recognized);

        let resolver = resolver.with_search_cwd(true);
        assert_eq!(resolver.resolve("local"), Recognition::Recognized);
    }

    #[test]
    fn extension_suffixes_are_tried() {
        let bin = tempfile::tempdir().unwrap();
        make_executable(&bin.path().join("build.sh"));
        let mut s = settings();
        s.extensions = vec![".sh".to_string()];

        let resolver = PathResolver::from_settings(&s)
            .with_path(bin.path())
            .with_cwd(bin.path());
        assert_eq!(resolver.resolve("build"), Recognition::Recognized);
        assert_eq!(resolver.resolve("build.sh"), Recognition::Recognized);
    }

    #[test]
    fn open_association_and_directory() {
        let cwd = tempfile::tempdir().unwrap();
        fs::write(cwd.path().join("readme.TXT"), "hi").unwrap();
        fs::create_dir(cwd.path().join("src")).unwrap();
        let empty = tempfile::tempdir().unwrap();

        let resolver = PathResolver::from_settings(&settings())
            .with_path(empty.path())
            .with_cwd(cwd.path());
        assert_eq!(resolver.open_association("readme.TXT"), Some("xdg-open"));
        assert_eq!(resolver.resolve("readme.TXT"), Recognition::Recognized);
        assert_eq!(resolver.open_association("missing.txt"), None);
        assert_eq!(resolver.resolve("src"), Recognition::Directory);
        assert_eq!(resolver.resolve(""), Recognition::NotRecognized);
    }
}
