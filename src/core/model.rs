// LogStitch - core/model.rs
//
// Core data model types: parsed events, stream options and the shared
// progress/cancellation handles. No I/O.
//
// These types are the shared vocabulary across all layers.

use crate::core::temporal::TargetZone;
use crate::util::constants;
use chrono::{DateTime, FixedOffset};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Parsed event
// =============================================================================

/// One log event: a matching line plus any continuation lines merged into it.
///
/// Immutable once built; merging a continuation line consumes the event and
/// returns the extended one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvent {
    /// 1-based line number where the event begins.
    sequence: u64,

    timestamp: DateTime<FixedOffset>,

    /// Plain capture group name -> captured text. Blank captures are omitted.
    fields: BTreeMap<String, String>,

    /// Source text; continuation lines are joined with '\n'.
    text: String,

    /// False when the line matched without any temporal capture, in which
    /// case `timestamp` is the epoch in the target zone.
    #[serde(skip)]
    has_temporal_fields: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    truncated: bool,
}

impl ParsedEvent {
    pub fn new(
        sequence: u64,
        timestamp: DateTime<FixedOffset>,
        fields: BTreeMap<String, String>,
        text: String,
        has_temporal_fields: bool,
    ) -> Self {
        Self {
            sequence,
            timestamp,
            fields,
            text,
            has_temporal_fields,
            truncated: false,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn has_temporal_fields(&self) -> bool {
        self.has_temporal_fields
    }

    /// Whether continuation text was cut at the event size cap.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Append a continuation line.
    ///
    /// Once the text passes `max_text_bytes` it is cut at that size (on a
    /// character boundary) and marked with `TRUNCATION_MARKER`; further
    /// continuation lines are dropped.
    pub fn with_continuation(mut self, line: &str, max_text_bytes: usize) -> ParsedEvent {
        if self.truncated {
            return self;
        }
        self.text.reserve(line.len() + 1);
        self.text.push('\n');
        self.text.push_str(line);

        if self.text.len() > max_text_bytes {
            let mut cut = max_text_bytes;
            while !self.text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.text.truncate(cut);
            self.text.push_str(constants::TRUNCATION_MARKER);
            self.truncated = true;
            tracing::debug!(
                sequence = self.sequence,
                max_text_bytes,
                "Event text truncated"
            );
        }
        self
    }
}

// =============================================================================
// Stream options
// =============================================================================

/// What a stream does with a matching line whose timestamp cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemporalErrorPolicy {
    /// Yield the error (after any buffered event) and carry on.
    #[default]
    Fail,

    /// Drop the line with a warning.
    Skip,
}

/// Settings for one streaming parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Text encoding of the byte source. A BOM, when present, wins.
    pub encoding: &'static Encoding,

    /// Zone for timestamps without an explicit offset.
    pub zone: TargetZone,

    /// Characters read between two progress publications.
    pub progress_batch_chars: u64,

    /// Size cap for the merged text of one event.
    pub max_event_bytes: usize,

    pub on_temporal_error: TemporalErrorPolicy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            zone: TargetZone::Utc,
            progress_batch_chars: constants::DEFAULT_PROGRESS_BATCH_CHARS,
            max_event_bytes: constants::DEFAULT_MAX_EVENT_BYTES,
            on_temporal_error: TemporalErrorPolicy::Fail,
        }
    }
}

// =============================================================================
// Progress and cancellation handles
// =============================================================================

/// Characters consumed by a stream, readable from any thread.
///
/// Updated in batches, so a reader may lag the parser by up to one batch
/// until the stream ends.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle(Arc<AtomicU64>);

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chars_read(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn add(&self, chars: u64) {
        self.0.fetch_add(chars, Ordering::Relaxed);
    }
}

/// Cooperative cancellation flag shared between a stream and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Background ingestion messages
// =============================================================================

/// Totals for one completed ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub events: usize,
    pub temporal_errors: usize,
    pub chars_read: u64,
    pub duration: std::time::Duration,
}

/// Progress messages sent from the ingestion thread to its owner.
#[derive(Debug, Clone)]
pub enum IngestProgress {
    /// Parsing started with the given profile.
    Started { source: String, profile_id: String },

    /// A batch of parsed events (see EVENT_BATCH_SIZE).
    EventsBatch { events: Vec<ParsedEvent> },

    /// Characters consumed so far.
    Progress { chars_read: u64 },

    /// A line could not be timestamped; parsing continues.
    LineError { line_number: u64, error: String },

    /// The stream ended normally.
    Completed { summary: IngestSummary },

    /// The stream failed with a fatal error.
    Failed { error: String },

    /// Ingestion was cancelled before completion.
    Cancelled,
}
