// LogStitch - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::decode;
use crate::core::model::{ParseOptions, TemporalErrorPolicy};
use crate::core::temporal::TargetZone;
use crate::util::constants;
use directories::ProjectDirs;
use encoding_rs::Encoding;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogStitch configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/logstitch/ or %APPDATA%\LogStitch\config\)
    pub config_dir: PathBuf,

    /// Full path of config.toml.
    pub config_file: PathBuf,

    /// User profile directory (e.g. ~/.config/logstitch/profiles/)
    pub user_profiles_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        match ProjectDirs::from("", "", constants::APP_ID) {
            Some(proj_dirs) => {
                let paths = Self::rooted_at(proj_dirs.config_dir());
                tracing::debug!(
                    config = %paths.config_file.display(),
                    profiles = %paths.user_profiles_dir.display(),
                    "Platform paths resolved"
                );
                paths
            }
            None => {
                tracing::warn!("Could not determine platform directories, using current directory");
                Self::rooted_at(Path::new("."))
            }
        }
    }

    /// Paths for a config directory at `config_dir`.
    pub fn rooted_at(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            config_file: config_dir.join(constants::CONFIG_FILE_NAME),
            user_profiles_dir: config_dir.join(constants::PROFILES_DIR_NAME),
        }
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so an older binary still starts with a newer
/// config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[parsing]` section.
    pub parsing: ParsingSection,
    /// `[profiles]` section.
    pub profiles: ProfilesSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Encoding label for input bytes.
    pub encoding: Option<String>,
    /// Zone for timestamps without an offset.
    pub zone: Option<String>,
    /// Characters between progress publications.
    pub progress_batch_chars: Option<u64>,
    /// Cap on the merged text of one event.
    pub max_event_bytes: Option<usize>,
    /// "fail" or "skip".
    pub on_temporal_error: Option<String>,
}

/// `[profiles]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ProfilesSection {
    /// Profile directory used instead of the platform default.
    pub user_profile_directory: Option<String>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Parsing --
    pub encoding: &'static Encoding,
    pub zone: TargetZone,
    pub progress_batch_chars: u64,
    pub max_event_bytes: usize,
    pub on_temporal_error: TemporalErrorPolicy,

    // -- Profiles --
    /// Overrides the platform profile directory when set.
    pub user_profile_dir: Option<PathBuf>,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            zone: TargetZone::Utc,
            progress_batch_chars: constants::DEFAULT_PROGRESS_BATCH_CHARS,
            max_event_bytes: constants::DEFAULT_MAX_EVENT_BYTES,
            on_temporal_error: TemporalErrorPolicy::Fail,
            user_profile_dir: None,
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Stream options carrying the configured parsing settings.
    pub fn to_parse_options(&self) -> ParseOptions {
        ParseOptions {
            encoding: self.encoding,
            zone: self.zone,
            progress_batch_chars: self.progress_batch_chars,
            max_event_bytes: self.max_event_bytes,
            on_temporal_error: self.on_temporal_error,
        }
    }
}

/// Load and validate the config file at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first run).
/// If the file is unparseable, returns defaults with one warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let config = validate(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

/// Check each field against named constants, accumulating all problems.
fn validate(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Parsing: encoding --
    if let Some(ref label) = raw.parsing.encoding {
        match decode::resolve_encoding(label) {
            Ok(encoding) => config.encoding = encoding,
            Err(e) => warnings.push(format!(
                "[parsing] encoding: {e}. Using default ({}).",
                constants::DEFAULT_ENCODING
            )),
        }
    }

    // -- Parsing: zone --
    if let Some(ref zone) = raw.parsing.zone {
        match zone.parse::<TargetZone>() {
            Ok(z) => config.zone = z,
            Err(e) => warnings.push(format!(
                "[parsing] zone: {e}. Using default ({}).",
                constants::DEFAULT_ZONE
            )),
        }
    }

    // -- Parsing: progress_batch_chars --
    if let Some(chars) = raw.parsing.progress_batch_chars {
        if (constants::MIN_PROGRESS_BATCH_CHARS..=constants::MAX_PROGRESS_BATCH_CHARS)
            .contains(&chars)
        {
            config.progress_batch_chars = chars;
        } else {
            warnings.push(format!(
                "[parsing] progress_batch_chars = {chars} is out of range ({}-{}). Using default ({}).",
                constants::MIN_PROGRESS_BATCH_CHARS,
                constants::MAX_PROGRESS_BATCH_CHARS,
                constants::DEFAULT_PROGRESS_BATCH_CHARS,
            ));
        }
    }

    // -- Parsing: max_event_bytes --
    if let Some(bytes) = raw.parsing.max_event_bytes {
        if (constants::MIN_MAX_EVENT_BYTES..=constants::ABSOLUTE_MAX_EVENT_BYTES).contains(&bytes) {
            config.max_event_bytes = bytes;
        } else {
            warnings.push(format!(
                "[parsing] max_event_bytes = {bytes} is out of range ({}-{}). Using default ({}).",
                constants::MIN_MAX_EVENT_BYTES,
                constants::ABSOLUTE_MAX_EVENT_BYTES,
                constants::DEFAULT_MAX_EVENT_BYTES,
            ));
        }
    }

    // -- Parsing: on_temporal_error --
    if let Some(ref policy) = raw.parsing.on_temporal_error {
        match policy.to_lowercase().as_str() {
            "fail" => config.on_temporal_error = TemporalErrorPolicy::Fail,
            "skip" => config.on_temporal_error = TemporalErrorPolicy::Skip,
            other => warnings.push(format!(
                "[parsing] on_temporal_error = \"{other}\" is not recognised. \
                 Expected \"fail\" or \"skip\". Using default (fail).",
            )),
        }
    }

    // -- Profiles: user_profile_directory --
    if let Some(ref dir) = raw.profiles.user_profile_directory {
        if !dir.is_empty() {
            config.user_profile_dir = Some(PathBuf::from(dir));
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn load(content: &str) -> (AppConfig, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(constants::CONFIG_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        load_config(&path)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, warnings) = load_config(&dir.path().join("absent.toml"));
        assert!(warnings.is_empty());
        assert_eq!(config.encoding, encoding_rs::UTF_8);
        assert_eq!(config.zone, TargetZone::Utc);
        assert_eq!(config.max_event_bytes, constants::DEFAULT_MAX_EVENT_BYTES);
    }

    #[test]
    fn test_valid_config() {
        let (config, warnings) = load(
            r#"
[parsing]
encoding = "windows-1252"
zone = "+02:00"
progress_batch_chars = 4096
max_event_bytes = 2048
on_temporal_error = "Skip"

[profiles]
user_profile_directory = "/srv/profiles"

[logging]
level = "DEBUG"
file = "/tmp/logstitch.log"

[future_section]
whatever = 1
"#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(config.encoding, encoding_rs::WINDOWS_1252);
        assert_eq!(
            config.zone,
            TargetZone::Fixed(FixedOffset::east_opt(7200).unwrap())
        );
        assert_eq!(config.progress_batch_chars, 4096);
        assert_eq!(config.max_event_bytes, 2048);
        assert_eq!(config.on_temporal_error, TemporalErrorPolicy::Skip);
        assert_eq!(config.user_profile_dir, Some(PathBuf::from("/srv/profiles")));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.log_file.as_deref(), Some("/tmp/logstitch.log"));

        let options = config.to_parse_options();
        assert_eq!(options.max_event_bytes, 2048);
        assert_eq!(options.on_temporal_error, TemporalErrorPolicy::Skip);
    }

    #[test]
    fn test_invalid_values_fall_back_with_warnings() {
        let (config, warnings) = load(
            r#"
[parsing]
encoding = "klingon"
zone = "Mars/Olympus"
progress_batch_chars = 0
max_event_bytes = 10
on_temporal_error = "explode"

[logging]
level = "loud"
"#,
        );
        assert_eq!(warnings.len(), 6, "{warnings:?}");
        assert_eq!(config.encoding, encoding_rs::UTF_8);
        assert_eq!(config.zone, TargetZone::Utc);
        assert_eq!(config.progress_batch_chars, constants::DEFAULT_PROGRESS_BATCH_CHARS);
        assert_eq!(config.max_event_bytes, constants::DEFAULT_MAX_EVENT_BYTES);
        assert_eq!(config.on_temporal_error, TemporalErrorPolicy::Fail);
        assert!(config.log_level.is_none());
        assert!(warnings[0].starts_with("[parsing] encoding"));
    }

    #[test]
    fn test_unparseable_file_gives_defaults() {
        let (config, warnings) = load("[parsing\nzone = ");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Failed to parse"));
        assert_eq!(config.zone, TargetZone::Utc);
    }

    #[test]
    fn test_rooted_paths() {
        let paths = PlatformPaths::rooted_at(Path::new("/etc/logstitch"));
        assert_eq!(paths.config_file, Path::new("/etc/logstitch/config.toml"));
        assert_eq!(paths.user_profiles_dir, Path::new("/etc/logstitch/profiles"));
    }
}
