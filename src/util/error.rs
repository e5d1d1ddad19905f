// LogStitch - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation: every failure carries the data needed
// to diagnose it and keeps its cause reachable through `source()`.

use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

/// Top-level error type for all LogStitch operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogStitchError {
    /// Profile loading, validation or compilation failed.
    Profile(ProfileError),

    /// Log stream parsing failed.
    Parse(ParseError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// Export operation failed.
    Export(ExportError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LogStitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(e) => write!(f, "Profile error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LogStitchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Profile(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

/// Errors related to parsing profile loading, validation and compilation.
#[derive(Debug)]
pub enum ProfileError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Profile file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// A required field is missing from the profile definition.
    MissingField {
        profile_id: String,
        field: &'static str,
    },

    /// A capture group name has no alphanumeric characters left after
    /// sanitising.
    InvalidGroupName { profile_id: String, raw: String },

    /// Two capture groups of the same profile share a name.
    DuplicateGroup { profile_id: String, name: String },

    /// The line template references a `$NAME` token with no declared group.
    UnknownGroup { profile_id: String, token: String },

    /// A group declared with `kind = "temporal"` names no temporal field.
    UnknownTemporalGroup { profile_id: String, name: String },

    /// The expanded line pattern is not a valid regex.
    InvalidRegex {
        profile_id: String,
        pattern: String,
        source: regex::Error,
    },

    /// The expanded line pattern exceeds the maximum allowed length.
    RegexTooLong {
        profile_id: String,
        length: usize,
        max_length: usize,
    },

    /// Two user profiles declare the same ID.
    DuplicateId {
        id: String,
        path1: PathBuf,
        path2: PathBuf,
    },

    /// Maximum number of profiles exceeded.
    TooManyProfiles { count: usize, max: usize },

    /// I/O error reading a profile file.
    Io { path: PathBuf, source: io::Error },

    /// No loaded profile has the requested ID.
    NotFound { id: String },

    /// Auto-detection found no profile matching enough sample lines.
    NotDetected { sampled: usize },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Profile '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingField { profile_id, field } => {
                write!(
                    f,
                    "Profile '{profile_id}': missing required field '{field}'"
                )
            }
            Self::InvalidGroupName { profile_id, raw } => write!(
                f,
                "Profile '{profile_id}': capture group name '{raw}' has no alphanumeric characters"
            ),
            Self::DuplicateGroup { profile_id, name } => {
                write!(
                    f,
                    "Profile '{profile_id}': capture group '{name}' is declared twice"
                )
            }
            Self::UnknownGroup { profile_id, token } => write!(
                f,
                "Profile '{profile_id}': line template references '${token}' \
                 but no such capture group is declared"
            ),
            Self::UnknownTemporalGroup { profile_id, name } => write!(
                f,
                "Profile '{profile_id}': '{name}' is not a temporal capture group"
            ),
            Self::InvalidRegex {
                profile_id,
                pattern,
                source,
            } => write!(
                f,
                "Profile '{profile_id}': invalid line pattern ('{pattern}'): {source}"
            ),
            Self::RegexTooLong {
                profile_id,
                length,
                max_length,
            } => write!(
                f,
                "Profile '{profile_id}': line pattern is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::DuplicateId { id, path1, path2 } => write!(
                f,
                "Duplicate profile ID '{id}' in '{}' and '{}'",
                path1.display(),
                path2.display()
            ),
            Self::TooManyProfiles { count, max } => {
                write!(f, "Too many profiles loaded ({count}), maximum is {max}")
            }
            Self::Io { path, source } => {
                write!(
                    f,
                    "I/O error reading profile '{}': {source}",
                    path.display()
                )
            }
            Self::NotFound { id } => {
                write!(f, "No profile with ID '{id}' (see --list-profiles)")
            }
            Self::NotDetected { sampled } => write!(
                f,
                "No profile matches the first {sampled} lines; choose one with --profile"
            ),
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ProfileError> for LogStitchError {
    fn from(e: ProfileError) -> Self {
        Self::Profile(e)
    }
}

// ---------------------------------------------------------------------------
// Temporal errors
// ---------------------------------------------------------------------------

/// Errors raised while turning captured fragments into a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalError {
    /// Captured text is not a number the group understands.
    InvalidNumber {
        group: &'static str,
        raw: String,
        source: ParseIntError,
    },

    /// Offset is outside what a zone offset can express (+/- 24h).
    InvalidOffset { raw: String },

    /// Value does not fit the component it targets.
    OutOfRange {
        group: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Assembled components do not form a calendar date.
    InvalidDate { year: i64, month: u32, day: u32 },

    /// An instant or duration would not fit the supported date range.
    Overflow { group: &'static str, value: i64 },

    /// One line captured both an elapsed field and a time-of-day field.
    MixedElapsedAndCalendar,
}

impl fmt::Display for TemporalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber { group, raw, source } => {
                write!(f, "{group}: cannot convert '{raw}' to a number: {source}")
            }
            Self::InvalidOffset { raw } => write!(f, "OFFSET: '{raw}' is not a valid zone offset"),
            Self::OutOfRange {
                group,
                value,
                min,
                max,
            } => write!(f, "{group}: value {value} is outside {min}..={max}"),
            Self::InvalidDate { year, month, day } => {
                write!(f, "{year:04}-{month:02}-{day:02} is not a valid date")
            }
            Self::Overflow { group, value } => {
                write!(f, "{group}: value {value} is outside the supported time range")
            }
            Self::MixedElapsedAndCalendar => write!(
                f,
                "line captures both elapsed and time-of-day fields; \
                 a profile line must use one style or the other"
            ),
        }
    }
}

impl std::error::Error for TemporalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidNumber { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// Errors related to log stream parsing.
#[derive(Debug)]
pub enum ParseError {
    /// A matching line could not be timestamped. Scoped to that line.
    Temporal {
        line_number: u64,
        text: String,
        source: TemporalError,
    },

    /// Reading the underlying stream failed. Fatal to the stream.
    Io { line_number: u64, source: io::Error },
}

impl ParseError {
    /// Whether the stream that produced this error has ended.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporal {
                line_number,
                text,
                source,
            } => write!(
                f,
                "line {line_number}: cannot assemble timestamp ({source}) in '{}'",
                crate::util::constants::preview(text)
            ),
            Self::Io {
                line_number,
                source,
            } => write!(f, "I/O error after line {line_number}: {source}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Temporal { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<ParseError> for LogStitchError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The encoding label is not known to `encoding_rs`.
    UnknownEncoding { label: String },

    /// The time zone is neither UTC, local, a fixed offset nor an IANA name.
    InvalidZone { zone: String, reason: String },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::UnknownEncoding { label } => write!(f, "Unknown text encoding '{label}'"),
            Self::InvalidZone { zone, reason } => {
                write!(f, "Invalid time zone '{zone}': {reason}")
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogStitchError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to writing parsed events out.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export target.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for LogStitchError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// Convenience type alias for LogStitch results.
pub type Result<T> = std::result::Result<T, LogStitchError>;
