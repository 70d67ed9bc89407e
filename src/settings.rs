//! Global settings loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub recognizer: RecognizerSettings,
    pub popen: PopenSettings,
    pub idle: IdleSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerSettings {
    pub end_of_line_wait_ms: u64,
    pub arena_page_size: usize,
    pub arena_max_pages: usize,
    pub search_cwd: bool,
    pub ignore_case: bool,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// extension (lowercase, no dot) → open command.
    #[serde(default)]
    pub associations: HashMap<String, String>,
}

impl RecognizerSettings {
    pub fn end_of_line_wait(&self) -> Duration {
        Duration::from_millis(self.end_of_line_wait_ms)
    }

    /// Case folding for cache keys; forced on where the filesystem folds case.
    pub fn folds_case(&self) -> bool {
        self.ignore_case || cfg!(windows)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopenSettings {
    pub shell: String,
    pub shell_flag: String,
    pub relay_buffer_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdleSettings {
    pub max_timeout_ms: u64,
}

impl IdleSettings {
    pub fn max_timeout(&self) -> Option<Duration> {
        (self.max_timeout_ms > 0).then(|| Duration::from_millis(self.max_timeout_ms))
    }
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let mut s: Settings =
        toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    s.recognizer.associations = s
        .recognizer
        .associations
        .into_iter()
        .map(|(ext, cmd)| (ext.to_ascii_lowercase(), cmd))
        .collect();
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }

    check_positive!(recognizer.end_of_line_wait_ms);
    check_positive!(recognizer.arena_page_size);
    check_positive!(recognizer.arena_max_pages);
    check_positive!(popen.relay_buffer_size);

    for ext in &s.recognizer.extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(SettingsError::InvalidValue {
                field: "recognizer.extensions".to_string(),
                reason: format!("{ext:?} must look like \".ext\""),
            });
        }
    }
    for ext in s.recognizer.associations.keys() {
        if ext.is_empty() || ext.starts_with('.') {
            return Err(SettingsError::InvalidValue {
                field: format!("recognizer.associations.{ext}"),
                reason: "extension must be non-empty and given without a dot".to_string(),
            });
        }
    }

    Ok(())
}
