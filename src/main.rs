//! Camrec - webcam and microphone recorder
//!
//! Records camera video and microphone audio concurrently, merges the two
//! through an external media tool, and optionally stops on a spoken phrase.

mod audio;
mod cancel;
mod cli;
mod coordinator;
mod desktop;
mod models;
mod mux;
mod settings;
mod speech;
mod transcription;
mod video;

use anyhow::anyhow;
use clap::Parser;
use cli::{Args, Command};
use coordinator::{Coordinator, MergeOutcome};
use log::info;
use models::RecordConfig;
use settings::Settings;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cli::init_logging(&args);

    let mut settings = Settings::load();

    match args.command {
        Command::Record {
            save_dir,
            name,
            camera,
            fps,
            preview,
            stop_phrase,
            no_shortest,
            duration,
        } => {
            let save_dir = save_dir
                .or_else(|| settings.default_save_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            let config = RecordConfig {
                save_dir,
                base_name: name,
                camera_index: camera,
                fps,
                show_preview: preview,
                stop_phrase,
                shortest: !no_shortest,
            };
            run_record(settings, config, duration)
        }

        Command::Transcribe { file } => {
            let (path, text) = transcription::transcribe_to_text_file(&settings, &file)?;
            info!("Transcript saved to {}", path.display());
            println!("{}", text);
            Ok(())
        }

        Command::Play { file } => desktop::play(&file).map_err(|e| anyhow!(e)),

        Command::Open { path } => desktop::open_folder(&path).map_err(|e| anyhow!(e)),

        Command::SetToolPath { path } => {
            settings.set_tool_path(path.clone()).map_err(|e| anyhow!(e))?;
            match path {
                Some(path) => println!("Media tool set to {}", path.display()),
                None => println!("Media tool path cleared; will search PATH"),
            }
            Ok(())
        }
    }
}

/// Record until Enter, the optional duration, or a task-requested stop
fn run_record(
    settings: Settings,
    config: RecordConfig,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let mut coordinator = Coordinator::new(settings);
    let session = coordinator
        .start(config, None)
        .map_err(|e| anyhow!(e))?;
    println!("Recording to {}", session.output_dir.display());
    println!("Press Enter to stop.");

    // Detached on purpose: a blocked stdin read must not hold up shutdown
    let enter_pressed = cancel::CancelToken::new();
    {
        let enter_pressed = enter_pressed.clone();
        thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            enter_pressed.set();
        });
    }

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        if enter_pressed.is_set() {
            info!("Stop requested from the keyboard");
            break;
        }
        if coordinator.stop_requested() {
            info!("Stop requested by a capture task");
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!("Requested duration elapsed");
                break;
            }
        }
        thread::sleep(Duration::from_millis(100));
    }

    let report = coordinator.stop().map_err(|e| anyhow!(e))?;
    match report.outcome {
        MergeOutcome::Merged(merged) => {
            println!("Merged recording: {}", merged.display());
            Ok(())
        }
        MergeOutcome::SkippedToolMissing => {
            println!(
                "Merge tool not found; raw video and audio kept in {}",
                report.session.output_dir.display()
            );
            Ok(())
        }
        MergeOutcome::CaptureFailed(message) => Err(anyhow!(
            "capture failed ({}); partial files kept in {}",
            message,
            report.session.output_dir.display()
        )),
        MergeOutcome::NotAttempted(path) => Err(anyhow!(
            "capture failed: {} was never produced; merge not attempted",
            path.display()
        )),
        MergeOutcome::Failed(e) => Err(anyhow!(
            "merge failed ({}); raw files kept in {}",
            e,
            report.session.output_dir.display()
        )),
    }
}
