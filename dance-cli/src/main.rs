//! # Circle Dance - Note Extraction CLI
//!
//! Command line front-end of the note extraction core.
//!
//! ## Commands
//! - **play**: extracts the notes of an audio file, once per cloned sheet
//! - **listen**: extracts notes from the default microphone until stopped
//!
//! ## Architecture (listen)
//! - **Producer thread**: owned by `ListenSession`, captures audio and publishes notes
//! - **Main thread**: polls the note queue at ~60 Hz and prints what arrives
//! - **Shutdown**: Ctrl-C, the `--seconds` limit, or the producer dying

mod report;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dance_core::clip::analyze_file;
use dance_core::config::{AppConfig, StreamConfig, load_config};
use dance_core::extract::{ExtractionMode, Extractor};
use dance_core::stream::ListenSession;
use log::{error, info};

/// Interval between two polls of the note queue.
const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "circle-dance", version, about = "Extract notes from audio files or live input")]
struct Cli {
    /// Enable verbose mode
    #[arg(long, global = true)]
    verbose: bool,

    /// Enable debug mode
    #[arg(long, global = true)]
    debug: bool,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the notes of an audio file
    Play {
        /// Song to analyse; only WAV files are supported
        filename: PathBuf,

        #[command(flatten)]
        notes: NoteArgs,

        /// Number of sheets the clip is cloned into
        #[arg(long)]
        clones: Option<usize>,
    },
    /// Extract notes from the default input device
    Listen {
        #[command(flatten)]
        notes: NoteArgs,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,
    },
}

#[derive(Args, Debug)]
struct NoteArgs {
    /// Threshold for note detection, in (0, 1]
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Type of note to extract
    #[arg(long, value_enum, default_value_t = NoteType::Dot)]
    note_type: NoteType,

    /// Print notes as JSON
    #[arg(long)]
    json: bool,
}

/// Note shapes of the circular sheet. Dots are onsets, arcs have a duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum NoteType {
    Dot,
    Arc,
    Sarc,
}

impl NoteType {
    fn mode(self) -> ExtractionMode {
        match self {
            NoteType::Dot => ExtractionMode::Onsets,
            NoteType::Arc | NoteType::Sarc => ExtractionMode::Durations,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[MAIN] {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Play {
            filename,
            notes,
            clones,
        } => {
            apply_overrides(&mut config, &notes, clones);
            play(&filename, &notes, &config)
        }
        Command::Listen { notes, seconds } => {
            apply_overrides(&mut config, &notes, None);
            listen(&notes, seconds, &config)
        }
    }
}

fn apply_overrides(config: &mut AppConfig, notes: &NoteArgs, clones: Option<usize>) {
    if let Some(threshold) = notes.threshold {
        config.extraction.threshold = threshold;
    }
    if let Some(clones) = clones {
        config.extraction.n_clones = clones;
    }
}

fn play(filename: &Path, notes: &NoteArgs, config: &AppConfig) -> Result<()> {
    let mode = notes.note_type.mode();
    info!("[MAIN] Analysing {} ({:?})", filename.display(), mode);

    let sheets = analyze_file(filename, mode, &config.extraction)?;
    let mut out = io::stdout().lock();
    report::write_sheets(&mut out, &sheets, notes.json)?;
    out.flush()?;
    Ok(())
}

fn listen(notes: &NoteArgs, seconds: Option<f64>, config: &AppConfig) -> Result<()> {
    let mode = notes.note_type.mode();
    let extractor = Extractor::from_config(mode, &config.extraction)?;
    let stream_config = config
        .stream
        .clone()
        .unwrap_or_else(|| StreamConfig::for_mode(mode));
    let deadline = seconds
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .map(|limit| Instant::now() + limit);

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_for_ctrlc = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_for_ctrlc.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    info!("[MAIN] Listening for {mode:?}, press Ctrl-C to stop");
    let (session, subscriber) = ListenSession::spawn(stream_config, extractor)?;
    let mut out = io::stdout().lock();

    loop {
        for note in subscriber.drain() {
            report::write_note(&mut out, &note, notes.json)?;
        }
        out.flush()?;

        if stop_flag.load(Ordering::SeqCst) {
            info!("[MAIN] Interrupted, stopping");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("[MAIN] Time limit reached, stopping");
            break;
        }
        if !session.is_alive() {
            error!("[MAIN] Note producer is no longer running");
            // stop() hands back the producer's error
            session.stop()?;
            anyhow::bail!("note producer stopped unexpectedly");
        }
        thread::sleep(POLL_INTERVAL);
    }

    session.stop()?;
    for note in subscriber.drain() {
        report::write_note(&mut out, &note, notes.json)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_types_select_modes() {
        assert_eq!(NoteType::Dot.mode(), ExtractionMode::Onsets);
        assert_eq!(NoteType::Arc.mode(), ExtractionMode::Durations);
        assert_eq!(NoteType::Sarc.mode(), ExtractionMode::Durations);
    }

    #[test]
    fn play_arguments_parse() {
        let cli = Cli::try_parse_from([
            "circle-dance",
            "--verbose",
            "play",
            "song.wav",
            "-t",
            "0.5",
            "--note-type",
            "sarc",
            "--clones",
            "3",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Play {
            filename,
            notes,
            clones,
        } = cli.command
        else {
            panic!("expected play");
        };
        assert_eq!(filename, PathBuf::from("song.wav"));
        assert_eq!(notes.threshold, Some(0.5));
        assert_eq!(notes.note_type, NoteType::Sarc);
        assert_eq!(clones, Some(3));
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = AppConfig::default();
        config.extraction.threshold = 0.3;
        config.extraction.n_clones = 2;
        let notes = NoteArgs {
            threshold: Some(0.9),
            note_type: NoteType::Dot,
            json: false,
        };
        apply_overrides(&mut config, &notes, None);
        assert_eq!(config.extraction.threshold, 0.9);
        assert_eq!(config.extraction.n_clones, 2);
    }

    #[test]
    fn play_help_names_the_supported_format() {
        let mut command = <Cli as clap::CommandFactory>::command();
        let play = command
            .find_subcommand_mut("play")
            .expect("play subcommand")
            .render_help()
            .to_string();
        assert!(play.contains("only WAV"));
    }

    #[test]
    fn unknown_note_type_is_rejected() {
        assert!(Cli::try_parse_from(["circle-dance", "listen", "--note-type", "square"]).is_err());
    }
}
