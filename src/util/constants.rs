// LogStitch - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogStitch";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogStitch";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Streaming limits
// =============================================================================

/// Read chunk size in bytes fed to the text decoder.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Number of characters consumed between two progress publications.
///
/// Publishing on every line would make the atomic store and any observer
/// wake-up dominate CPU time on large files.
pub const DEFAULT_PROGRESS_BATCH_CHARS: u64 = 10_240;

/// Smallest accepted progress batch.
pub const MIN_PROGRESS_BATCH_CHARS: u64 = 1;

/// Largest accepted progress batch (64 MiB of characters).
pub const MAX_PROGRESS_BATCH_CHARS: u64 = 64 * 1024 * 1024;

/// Maximum size in bytes of the text of a single merged event. Continuation
/// lines past this bound are discarded and the text is marked truncated.
pub const DEFAULT_MAX_EVENT_BYTES: usize = 1024 * 1024; // 1 MiB

/// Smallest accepted event size cap.
pub const MIN_MAX_EVENT_BYTES: usize = 1024;

/// Largest accepted event size cap.
pub const ABSOLUTE_MAX_EVENT_BYTES: usize = 64 * 1024 * 1024;

/// Marker appended to event text that hit `max_event_bytes`.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Default text encoding label (resolved through `encoding_rs`).
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Default target time zone.
pub const DEFAULT_ZONE: &str = "UTC";

// =============================================================================
// Background ingestion
// =============================================================================

/// Number of parsed events accumulated before an `EventsBatch` is sent.
pub const EVENT_BATCH_SIZE: usize = 500;

// =============================================================================
// Profile limits
// =============================================================================

/// Maximum number of parsing profiles that can be loaded (built-in + user).
pub const MAX_PROFILES: usize = 100;

/// Maximum size of a profile TOML file in bytes.
pub const MAX_PROFILE_FILE_SIZE: u64 = 64 * 1024; // 64 KB

/// Maximum length of an expanded line pattern, to bound regex compile cost.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

/// Number of lines sampled from the start of an input for auto-detection.
pub const DEFAULT_DETECTION_LINES: usize = 20;

/// Most bytes buffered from the start of an input to find the sample lines.
pub const MAX_SAMPLE_BYTES: usize = 1024 * 1024; // 1 MiB

/// Minimum share of sample lines (0.0-1.0) a profile must match to be picked.
pub const AUTO_DETECT_MIN_CONFIDENCE: f64 = 0.3;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// User profiles subdirectory name.
pub const PROFILES_DIR_NAME: &str = "profiles";

/// Clip `line` to `DEBUG_MAX_LINE_PREVIEW` characters for log output.
pub fn preview(line: &str) -> &str {
    match line.char_indices().nth(DEBUG_MAX_LINE_PREVIEW) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
