//! External media tool adapter
//!
//! Wraps the single ffmpeg invocations this system needs: muxing a session's
//! video and audio files into one deliverable, and extracting a 16 kHz mono
//! WAV from merged media ahead of transcription. The tool runs synchronously
//! as a subprocess; a non-zero exit code is a hard failure for that
//! operation, with stderr attached. Timing alignment of the two streams is
//! entirely the tool's job.

use log::{debug, info};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Executable searched for when no explicit tool path is configured
const TOOL_NAME: &str = "ffmpeg";

/// Ceiling for the input readiness poll
pub const READY_TIMEOUT: Duration = Duration::from_secs(3);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failures of the merge / extract operations
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("media tool not found; install ffmpeg or configure its path")]
    ToolNotFound,

    #[error("input file not ready: {0}")]
    InputNotReady(PathBuf),

    #[error("media tool exited with code {code}: {stderr}")]
    ToolFailed { code: i32, stderr: String },

    #[error("failed to run media tool: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Handle to a resolved external media tool
pub struct Muxer {
    tool_path: PathBuf,
}

impl Muxer {
    /// Resolve the tool: explicit configured path first, then `PATH`
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, MuxError> {
        let tool_path = match explicit {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(_) | None => find_in_path(TOOL_NAME).ok_or(MuxError::ToolNotFound)?,
        };
        debug!("Using media tool at {}", tool_path.display());
        Ok(Self { tool_path })
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }

    /// Mux `video` and `audio` into `<video_stem>_with_audio.mp4`
    ///
    /// Both inputs must pass the readiness poll before the tool is invoked;
    /// capture tasks may still be flushing when this is called.
    pub fn merge(&self, video: &Path, audio: &Path, shortest: bool) -> Result<PathBuf, MuxError> {
        for input in [video, audio] {
            if !wait_for_file(input, READY_TIMEOUT) {
                return Err(MuxError::InputNotReady(input.to_path_buf()));
            }
        }

        let output = merged_output_path(video);
        self.run(&merge_args(video, audio, &output, shortest))?;
        info!("Merged output written to {}", output.display());
        Ok(output)
    }

    /// Extract the audio track of `media` into a sibling 16 kHz mono WAV
    ///
    /// The extracted file is left on disk next to the source, under a name
    /// that cannot collide with a session's own `<base>.wav` capture file.
    pub fn extract_audio(&self, media: &Path) -> Result<PathBuf, MuxError> {
        if !wait_for_file(media, READY_TIMEOUT) {
            return Err(MuxError::InputNotReady(media.to_path_buf()));
        }
        let output = extract_output_path(media);
        self.run(&extract_args(media, &output))?;
        info!("Audio track extracted to {}", output.display());
        Ok(output)
    }

    fn run(&self, args: &[OsString]) -> Result<(), MuxError> {
        debug!("Running {} with {:?}", self.tool_path.display(), args);
        let output = Command::new(&self.tool_path).args(args).output()?;
        if !output.status.success() {
            return Err(MuxError::ToolFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// `<video_stem>_with_audio.mp4` next to the video input
fn merged_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{}_with_audio.mp4", stem))
}

/// `<media_stem>_extracted.wav` next to the source
///
/// The tool runs with `-y`, so the target must never shadow the session's
/// captured `<base>.wav`.
fn extract_output_path(media: &Path) -> PathBuf {
    let stem = media
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    media.with_file_name(format!("{}_extracted.wav", stem))
}

/// Arguments for the merge invocation: video is stream 0 copied as-is, audio
/// is stream 1 encoded to AAC at 192k
fn merge_args(video: &Path, audio: &Path, output: &Path, shortest: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
    ];
    if shortest {
        args.push("-shortest".into());
    }
    args.push(output.into());
    args
}

/// Arguments for the pre-transcription audio extraction
fn extract_args(media: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        media.into(),
        "-vn".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        "16000".into(),
        "-ac".into(),
        "1".into(),
        output.into(),
    ]
}

/// Poll until `path` exists with non-zero size, up to `timeout`
///
/// Capture threads may lag a little behind the bounded joins; this tolerates
/// a short flush delay before declaring the file missing.
pub fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > 0 {
                return true;
            }
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(READY_POLL_INTERVAL);
    }
}

/// Look up an executable in the `PATH` directories
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
