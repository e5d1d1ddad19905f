// LogStitch - app/ingest.rs
//
// Background ingestion. Drives one `LogEventParser` on a worker thread and
// delivers batched events and progress to the owning thread via an mpsc
// channel.
//
// Architecture:
//   - `IngestManager` lives on the owning thread; `run_ingest` runs on the worker.
//   - A `CancelFlag` shared with the parser stops the stream at its next pull.
//   - All cross-thread communication is via `IngestProgress` channel messages.

use crate::core::model::{CancelFlag, IngestProgress, IngestSummary, ParseOptions, ParsedEvent};
use crate::core::parser::LogEventParser;
use crate::core::pattern::CompiledProfile;
use crate::util::constants;
use crate::util::error::ParseError;
use std::io::Read;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Instant;

/// Manages one ingestion on a background thread.
pub struct IngestManager {
    /// Channel receiver for progress messages.
    pub progress_rx: Option<mpsc::Receiver<IngestProgress>>,

    /// Cancel flag shared with the background parser.
    cancel_flag: Option<CancelFlag>,

    worker: Option<JoinHandle<()>>,
}

impl IngestManager {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
            worker: None,
        }
    }

    /// Start parsing `reader` with `profile` on a new thread.
    ///
    /// If an ingestion is already running it is cancelled first.
    pub fn start<R>(
        &mut self,
        source_name: String,
        reader: R,
        profile: Arc<CompiledProfile>,
        options: ParseOptions,
    ) where
        R: Read + Send + 'static,
    {
        self.cancel();

        let (tx, rx) = mpsc::channel();
        let cancel = CancelFlag::new();

        self.progress_rx = Some(rx);
        self.cancel_flag = Some(cancel.clone());

        tracing::info!(source = %source_name, profile_id = %profile.id(), "Ingestion started");

        self.worker = Some(std::thread::spawn(move || {
            run_ingest(source_name, reader, profile, options, tx, cancel);
        }));
    }

    /// Request cancellation. The worker sends `IngestProgress::Cancelled`
    /// and exits.
    pub fn cancel(&mut self) {
        if let Some(flag) = self.cancel_flag.take() {
            flag.cancel();
        }
    }

    /// Poll for progress messages without blocking. Returns all pending messages.
    pub fn poll_progress(&self) -> Vec<IngestProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }

    /// Block until the worker thread exits.
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Ingestion thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Default for IngestManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the whole stream, sending batches and progress to `tx`.
///
/// Runs on a background thread. Stops quietly if the receiver is dropped.
fn run_ingest<R: Read>(
    source_name: String,
    reader: R,
    profile: Arc<CompiledProfile>,
    options: ParseOptions,
    tx: mpsc::Sender<IngestProgress>,
    cancel: CancelFlag,
) {
    macro_rules! send {
        ($msg:expr) => {
            if tx.send($msg).is_err() {
                return; // Receiver dropped; exit quietly.
            }
        };
    }

    let started = Instant::now();
    send!(IngestProgress::Started {
        source: source_name.clone(),
        profile_id: profile.id().to_string(),
    });

    let mut parser = LogEventParser::new(reader, profile, options).with_cancel_flag(cancel.clone());
    let progress = parser.progress();
    let mut batch: Vec<ParsedEvent> = Vec::with_capacity(constants::EVENT_BATCH_SIZE);
    let mut summary = IngestSummary::default();
    let mut last_reported = 0u64;

    for item in parser.by_ref() {
        match item {
            Ok(event) => {
                summary.events += 1;
                batch.push(event);
                if batch.len() >= constants::EVENT_BATCH_SIZE {
                    send!(IngestProgress::EventsBatch {
                        events: std::mem::take(&mut batch),
                    });
                }
            }
            Err(ParseError::Temporal {
                line_number,
                source,
                ..
            }) => {
                summary.temporal_errors += 1;
                send!(IngestProgress::LineError {
                    line_number,
                    error: source.to_string(),
                });
            }
            Err(e) => {
                if !batch.is_empty() {
                    send!(IngestProgress::EventsBatch {
                        events: std::mem::take(&mut batch),
                    });
                }
                tracing::error!(source = %source_name, error = %e, "Ingestion failed");
                send!(IngestProgress::Failed {
                    error: e.to_string(),
                });
                return;
            }
        }

        let chars_read = progress.chars_read();
        if chars_read != last_reported {
            last_reported = chars_read;
            send!(IngestProgress::Progress { chars_read });
        }
    }

    if cancel.is_cancelled() {
        tracing::info!(source = %source_name, events = summary.events, "Ingestion cancelled");
        send!(IngestProgress::Cancelled);
        return;
    }

    if !batch.is_empty() {
        send!(IngestProgress::EventsBatch { events: batch });
    }

    summary.chars_read = progress.chars_read();
    summary.duration = started.elapsed();
    tracing::info!(
        source = %source_name,
        events = summary.events,
        temporal_errors = summary.temporal_errors,
        chars = summary.chars_read,
        duration_ms = summary.duration.as_millis() as u64,
        "Ingestion complete"
    );
    send!(IngestProgress::Completed { summary });
}
