// LogStitch - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Parsing profile loading (built-in + user-defined) and auto-detection
// 4. Streaming the input through the parser into JSON lines or CSV

use clap::Parser;
use logstitch::app::{ingest::IngestManager, profile_mgr};
use logstitch::core::export::{EventWriter, ExportFormat};
use logstitch::core::model::{IngestProgress, TemporalErrorPolicy};
use logstitch::core::pattern::CompiledProfile;
use logstitch::core::{decode, profile};
use logstitch::platform::{config, fs};
use logstitch::util::constants;
use logstitch::util::error::{ExportError, LogStitchError, ProfileError};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// LogStitch - turn raw log text into timestamped, multi-line events.
///
/// Each line is matched against a parsing profile; lines that do not match
/// (stack traces, wrapped messages) are stitched onto the event before them.
#[derive(Parser, Debug)]
#[command(name = "logstitch", version, about)]
struct Cli {
    /// Log file to parse (stdin if omitted).
    file: Option<PathBuf>,

    /// Parsing profile ID (auto-detected if omitted).
    #[arg(short = 'p', long = "profile")]
    profile: Option<String>,

    /// Directory containing user-defined parsing profiles.
    #[arg(long = "profile-dir")]
    profile_dir: Option<PathBuf>,

    /// Zone for timestamps without an offset: UTC, local, +02:00 or an IANA name.
    #[arg(short = 'z', long = "zone")]
    zone: Option<String>,

    /// Input encoding label (utf-8, utf-16le, windows-1252, ...).
    #[arg(short = 'e', long = "encoding")]
    encoding: Option<String>,

    /// Output format.
    #[arg(short = 'f', long = "format", default_value = "json")]
    format: ExportFormat,

    /// Write events to this file instead of stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Drop lines whose timestamp cannot be built instead of reporting them.
    #[arg(long = "skip-bad-timestamps")]
    skip_bad_timestamps: bool,

    /// Config file to use instead of the platform default.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// List available profiles and exit.
    #[arg(long = "list-profiles")]
    list_profiles: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let platform_paths = config::PlatformPaths::resolve();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| platform_paths.config_file.clone());
    let (app_config, config_warnings) = config::load_config(&config_path);

    logstitch::util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );
    for warning in &config_warnings {
        tracing::warn!("{}", warning);
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "LogStitch starting"
    );

    match run(&cli, app_config, &platform_paths) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "LogStitch failed");
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(
    cli: &Cli,
    mut app_config: config::AppConfig,
    platform_paths: &config::PlatformPaths,
) -> Result<ExitCode, LogStitchError> {
    // CLI flags override config.toml.
    if let Some(ref zone) = cli.zone {
        app_config.zone = zone.parse()?;
    }
    if let Some(ref label) = cli.encoding {
        app_config.encoding = decode::resolve_encoding(label)?;
    }
    if cli.skip_bad_timestamps {
        app_config.on_temporal_error = TemporalErrorPolicy::Skip;
    }

    // Profile directory: CLI override > config > platform default
    let user_profile_dir = cli
        .profile_dir
        .as_deref()
        .or(app_config.user_profile_dir.as_deref())
        .unwrap_or(&platform_paths.user_profiles_dir);

    let (profiles, profile_errors) = profile_mgr::load_all_profiles(Some(user_profile_dir));
    for err in &profile_errors {
        tracing::warn!(error = %err, "Profile loading warning");
    }

    if cli.list_profiles {
        print_profiles(&profiles).map_err(|e| LogStitchError::Io {
            path: PathBuf::from("-"),
            operation: "write",
            source: e,
        })?;
        return Ok(ExitCode::SUCCESS);
    }

    let input = fs::open_input(cli.file.as_deref())?;
    let source_name = cli
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stdin>".to_string());

    let (reader, selected): (Box<dyn io::Read + Send>, Arc<CompiledProfile>) = match cli.profile {
        Some(ref id) => {
            let selected =
                profile_mgr::find(&profiles, id).ok_or_else(|| ProfileError::NotFound { id: id.clone() })?;
            (input, selected)
        }
        None => {
            let sampled = fs::sample_lines(input, app_config.encoding, constants::DEFAULT_DETECTION_LINES)
                .map_err(|e| LogStitchError::Io {
                    path: PathBuf::from(&source_name),
                    operation: "read",
                    source: e,
                })?;
            let detected = profile::auto_detect(&sampled.lines, &profiles).ok_or(
                ProfileError::NotDetected {
                    sampled: sampled.lines.len(),
                },
            )?;
            tracing::info!(
                profile_id = %detected.profile_id,
                confidence = detected.confidence,
                "Profile auto-detected"
            );
            let selected = profile_mgr::find(&profiles, &detected.profile_id).ok_or(
                ProfileError::NotFound {
                    id: detected.profile_id,
                },
            )?;
            (Box::new(sampled.reader), selected)
        }
    };

    let output_path = cli.output.clone().unwrap_or_else(|| PathBuf::from("-"));
    let sink: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(std::fs::File::create(path).map_err(|e| {
            LogStitchError::Io {
                path: path.clone(),
                operation: "create",
                source: e,
            }
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = EventWriter::new(sink, cli.format, &output_path)?;

    let mut manager = IngestManager::new();
    manager.start(source_name, reader, selected, app_config.to_parse_options());
    let code = drain(&mut manager, &mut writer)?;
    manager.wait();

    let written = writer.finish()?;
    tracing::debug!(written, output = %output_path.display(), "Output finished");
    Ok(code)
}

/// Write events as they arrive until the ingestion ends.
fn drain<W: Write>(
    manager: &mut IngestManager,
    writer: &mut EventWriter<W>,
) -> Result<ExitCode, ExportError> {
    let Some(rx) = manager.progress_rx.take() else {
        return Ok(ExitCode::SUCCESS);
    };

    let mut code = ExitCode::SUCCESS;
    for message in rx {
        match message {
            IngestProgress::Started { source, profile_id } => {
                tracing::info!(source = %source, profile_id = %profile_id, "Parsing");
            }
            IngestProgress::EventsBatch { events } => {
                for event in &events {
                    if let Err(e) = writer.write(event) {
                        manager.cancel();
                        return Err(e);
                    }
                }
            }
            IngestProgress::Progress { chars_read } => {
                tracing::trace!(chars_read, "Progress");
            }
            IngestProgress::LineError { line_number, error } => {
                tracing::warn!(line_number, error = %error, "Line has an invalid timestamp");
            }
            IngestProgress::Completed { summary } => {
                tracing::info!(
                    events = summary.events,
                    temporal_errors = summary.temporal_errors,
                    chars = summary.chars_read,
                    "Done"
                );
            }
            IngestProgress::Failed { error } => {
                eprintln!("Error: {error}");
                code = ExitCode::FAILURE;
            }
            IngestProgress::Cancelled => {
                code = ExitCode::FAILURE;
            }
        }
    }
    Ok(code)
}

fn print_profiles(profiles: &[Arc<CompiledProfile>]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    for p in profiles {
        let origin = if p.profile().is_builtin { "built-in" } else { "user" };
        writeln!(out, "{:<16} {:<10} {}", p.id(), origin, p.profile().name)?;
    }
    Ok(())
}
