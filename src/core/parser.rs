// LogStitch - core/parser.rs
//
// Line and stream parsing with a compiled profile.
// Core layer: accepts Read trait objects, never touches the filesystem.
//
// `EventParser` turns one line into at most one event. `LogEventParser`
// drives it over a byte stream, holding back the most recent event until
// the next matching line (or end of input) proves it complete, so unmatched
// continuation lines such as stack traces are merged into it.

use crate::core::decode::LineSource;
use crate::core::model::{CancelFlag, ParseOptions, ParsedEvent, ProgressHandle, TemporalErrorPolicy};
use crate::core::pattern::CompiledProfile;
use crate::core::profile::ParsingProfile;
use crate::core::temporal::{TargetZone, TimestampAccumulator};
use crate::util::constants;
use crate::util::error::{ParseError, ProfileError};
use std::collections::BTreeMap;
use std::io::Read;
use std::mem;
use std::sync::Arc;

// =============================================================================
// Single-line parser
// =============================================================================

/// Matches single lines against a compiled profile.
#[derive(Debug, Clone)]
pub struct EventParser {
    profile: Arc<CompiledProfile>,
    zone: TargetZone,
}

impl EventParser {
    pub fn new(profile: Arc<CompiledProfile>, zone: TargetZone) -> Self {
        Self { profile, zone }
    }

    /// Compile `profile` and build a parser for it.
    pub fn from_profile(profile: ParsingProfile, zone: TargetZone) -> Result<Self, ProfileError> {
        Ok(Self::new(Arc::new(CompiledProfile::compile(profile)?), zone))
    }

    pub fn profile(&self) -> &Arc<CompiledProfile> {
        &self.profile
    }

    pub fn zone(&self) -> TargetZone {
        self.zone
    }

    /// Parse one line.
    ///
    /// Returns `Ok(None)` when the line does not match the profile. On a match,
    /// temporal captures are applied in profile order and non-blank plain
    /// captures become fields. A match without any temporal capture is
    /// stamped with the epoch in the target zone.
    pub fn parse(&self, line_number: u64, text: &str) -> Result<Option<ParsedEvent>, ParseError> {
        let Some(caps) = self.profile.captures(text) else {
            return Ok(None);
        };

        let temporal_error = |source| ParseError::Temporal {
            line_number,
            text: text.to_string(),
            source,
        };

        let mut timestamp = TimestampAccumulator::new(self.zone);
        let mut fields = BTreeMap::new();
        let mut has_temporal_fields = false;

        for group in self.profile.captured_groups() {
            let Some(m) = caps.name(group.name()) else {
                continue;
            };
            let value = m.as_str();
            if value.trim().is_empty() {
                continue;
            }
            match group.as_temporal() {
                Some(temporal) => {
                    has_temporal_fields = true;
                    timestamp.apply(temporal, value).map_err(temporal_error)?;
                }
                None => {
                    fields.insert(group.name().to_string(), value.to_string());
                }
            }
        }

        let timestamp = timestamp.finish().map_err(temporal_error)?;
        Ok(Some(ParsedEvent::new(
            line_number,
            timestamp,
            fields,
            text.to_string(),
            has_temporal_fields,
        )))
    }
}

// =============================================================================
// Streaming multi-line parser
// =============================================================================

enum State {
    /// No event held back; the next matching line starts one.
    AwaitingLine,
    /// An event that later continuation lines may still extend.
    HaveBufferedEvent(ParsedEvent),
    /// End of input, fatal error, cancellation or close. Terminal.
    Exhausted,
}

/// Lazily parses events from a byte stream.
///
/// Yields `Ok(event)` for each complete event, `Err(ParseError::Temporal)`
/// for a matching line that could not be timestamped (unless the policy is
/// `Skip`), and at most one `Err(ParseError::Io)`, after which the stream is
/// over. The reader is dropped as soon as the stream ends, is cancelled or is
/// closed.
pub struct LogEventParser<R> {
    parser: EventParser,
    source: Option<LineSource<R>>,
    state: State,
    /// Error to yield on the next pull, queued behind a buffered event.
    queued_error: Option<ParseError>,
    line_number: u64,
    unpublished_chars: u64,
    progress_batch_chars: u64,
    max_event_bytes: usize,
    on_temporal_error: TemporalErrorPolicy,
    progress: ProgressHandle,
    cancel: CancelFlag,
}

impl<R: Read> LogEventParser<R> {
    pub fn new(reader: R, profile: Arc<CompiledProfile>, options: ParseOptions) -> Self {
        tracing::debug!(
            profile_id = %profile.id(),
            encoding = options.encoding.name(),
            zone = %options.zone,
            "Stream parser created"
        );
        Self {
            parser: EventParser::new(profile, options.zone),
            source: Some(LineSource::new(reader, options.encoding)),
            state: State::AwaitingLine,
            queued_error: None,
            line_number: 0,
            unpublished_chars: 0,
            progress_batch_chars: options.progress_batch_chars.max(1),
            max_event_bytes: options.max_event_bytes,
            on_temporal_error: options.on_temporal_error,
            progress: ProgressHandle::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Observe or cancel this stream through an externally owned flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress into an externally owned handle.
    pub fn with_progress_handle(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    fn pull(&mut self) -> Option<Result<ParsedEvent, ParseError>> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(line_number = self.line_number, "Stream parser cancelled");
                self.close();
                return None;
            }

            let read = match self.source.as_mut() {
                Some(source) => source.next_line(),
                None => {
                    self.state = State::Exhausted;
                    return None;
                }
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!(lines = self.line_number, "End of stream");
                    self.release();
                    return match mem::replace(&mut self.state, State::Exhausted) {
                        State::HaveBufferedEvent(event) => Some(Ok(event)),
                        _ => None,
                    };
                }
                Err(source) => {
                    tracing::warn!(
                        line_number = self.line_number,
                        error = %source,
                        "Read failed, stream ended"
                    );
                    self.close();
                    return Some(Err(ParseError::Io {
                        line_number: self.line_number,
                        source,
                    }));
                }
            };

            self.line_number += 1;
            self.record_progress(line.chars().count() as u64);

            match self.parser.parse(self.line_number, &line) {
                Ok(Some(event)) => {
                    if let State::HaveBufferedEvent(previous) =
                        mem::replace(&mut self.state, State::HaveBufferedEvent(event))
                    {
                        return Some(Ok(previous));
                    }
                }
                Ok(None) => {
                    self.state = match mem::replace(&mut self.state, State::AwaitingLine) {
                        State::HaveBufferedEvent(event) => State::HaveBufferedEvent(
                            event.with_continuation(&line, self.max_event_bytes),
                        ),
                        other => {
                            tracing::debug!(
                                line_number = self.line_number,
                                line = constants::preview(&line),
                                "Dropping unmatched line before first event"
                            );
                            other
                        }
                    };
                }
                Err(err) => match self.on_temporal_error {
                    TemporalErrorPolicy::Skip => {
                        tracing::warn!(error = %err, "Skipping line with invalid timestamp");
                    }
                    TemporalErrorPolicy::Fail => {
                        return match mem::replace(&mut self.state, State::AwaitingLine) {
                            State::HaveBufferedEvent(previous) => {
                                self.queued_error = Some(err);
                                Some(Ok(previous))
                            }
                            _ => Some(Err(err)),
                        };
                    }
                },
            }
        }
    }

    fn record_progress(&mut self, chars: u64) {
        self.unpublished_chars += chars;
        if self.unpublished_chars >= self.progress_batch_chars {
            self.progress.add(self.unpublished_chars);
            self.unpublished_chars = 0;
        }
    }
}

impl<R> LogEventParser<R> {
    /// Shared handle reporting the characters consumed so far.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    /// Shared flag that stops this stream at its next pull.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Lines read so far.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// End the stream now: drop the reader, any buffered event and any queued
    /// error. Later pulls return `None`.
    pub fn close(&mut self) {
        self.release();
        self.queued_error = None;
        self.state = State::Exhausted;
    }

    /// Drop the reader and publish any progress still held back.
    fn release(&mut self) {
        if self.unpublished_chars > 0 {
            self.progress.add(self.unpublished_chars);
            self.unpublished_chars = 0;
        }
        if self.source.take().is_some() {
            tracing::trace!(line_number = self.line_number, "Reader released");
        }
    }
}

impl<R: Read> Iterator for LogEventParser<R> {
    type Item = Result<ParsedEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        if let Some(err) = self.queued_error.take() {
            if !self.cancel.is_cancelled() {
                return Some(Err(err));
            }
        }
        self.pull()
    }
}

impl<R> Drop for LogEventParser<R> {
    fn drop(&mut self) {
        self.release();
    }
}
