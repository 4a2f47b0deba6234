//! Command-line interface for Camrec
//!
//! Handles argument parsing and logging configuration.

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

/// Camrec - webcam and microphone recorder
#[derive(Parser, Debug)]
#[command(name = "camrec")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record webcam and microphone until stopped, then merge
    Record {
        /// Directory the timestamped session directory is created under
        /// (defaults to the configured save directory, then the cwd)
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Base name for the session's files
        #[arg(long, default_value = "recording")]
        name: String,

        /// Camera index (/dev/video<N>)
        #[arg(long, default_value_t = 0)]
        camera: u32,

        /// Target frame rate
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Drive an on-screen preview if a surface is available
        #[arg(long)]
        preview: bool,

        /// Spoken phrase that stops the recording when recognized
        #[arg(long, default_value = "stop recording")]
        stop_phrase: String,

        /// Do not truncate the merged file to the shorter stream
        #[arg(long)]
        no_shortest: bool,

        /// Stop automatically after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Transcribe a WAV or merged media file to a sibling .txt
    Transcribe {
        file: PathBuf,
    },

    /// Play a recorded file
    Play {
        file: PathBuf,
    },

    /// Open a session directory in the file manager
    Open {
        path: PathBuf,
    },

    /// Set the external media tool path (omit the path to autodetect)
    SetToolPath {
        path: Option<PathBuf>,
    },
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set camrec modules to requested verbosity level
    builder.filter_module("camrec", args.log_level());

    // Dependency internals only at -vvvv (very verbose)
    if args.verbose >= 4 {
        builder.filter_module("reqwest", args.log_level());
        builder.filter_module("pipewire", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
