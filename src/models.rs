use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Parameters for one recording attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Directory the timestamped session directory is created under
    pub save_dir: PathBuf,
    /// Base name for the session's files (sanitized before use)
    pub base_name: String,
    /// Camera index, i.e. /dev/video<N>
    pub camera_index: u32,
    /// Target frame rate for the video container
    pub fps: u32,
    /// Whether the capture loop should drive an on-screen preview
    pub show_preview: bool,
    /// Spoken phrase that requests a stop when recognized
    pub stop_phrase: String,
    /// Truncate the merged file to the shorter input stream
    pub shortest: bool,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("."),
            base_name: "recording".to_string(),
            camera_index: 0,
            fps: 30,
            show_preview: false,
            stop_phrase: "stop recording".to_string(),
            shortest: true,
        }
    }
}

/// Replace any path-unsafe character in a base name with an underscore
pub fn sanitize_base_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "recording".to_string()
    } else {
        sanitized
    }
}

/// One start-to-merge recording attempt and its output files
///
/// Created on start, mutated only by the coordinator (the merged path is set
/// after a successful merge). Files persist on disk regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    /// Absent until the external merge succeeds
    pub merged_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Allocate session paths under `<save_dir>/<YYYY-MM-DD_HH-MM-SS>/`
    ///
    /// Only computes paths; the directory is created by the coordinator once
    /// the session is accepted.
    pub fn new(save_dir: &Path, base_name: &str) -> Self {
        let started_at = Utc::now();
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let base = sanitize_base_name(base_name);
        let output_dir = save_dir.join(stamp);
        Self {
            video_path: output_dir.join(format!("{}.mp4", base)),
            audio_path: output_dir.join(format!("{}.wav", base)),
            merged_path: None,
            base_name: base,
            output_dir,
            started_at,
        }
    }

    /// Path the merged file will have: `<base>_with_audio.mp4`
    pub fn merged_target(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_with_audio.mp4", self.base_name))
    }
}

/// Ordered list of completed sessions, most recent first
///
/// Append-only for the lifetime of the program; not persisted across runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingHistory {
    sessions: Vec<Session>,
}

impl RecordingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, session: Session) {
        self.sessions.insert(0, session);
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_base_name("demo-take_2.v1"), "demo-take_2.v1");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_base_name("a/b\\c: d*e"), "a_b_c__d_e");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_base_name(""), "recording");
    }

    #[test]
    fn test_session_paths_share_one_directory() {
        let session = Session::new(Path::new("/tmp/caps"), "demo");
        assert_eq!(
            session.video_path.parent(),
            Some(session.output_dir.as_path())
        );
        assert_eq!(
            session.audio_path.parent(),
            Some(session.output_dir.as_path())
        );
        assert_eq!(session.video_path.file_name().unwrap(), "demo.mp4");
        assert_eq!(session.audio_path.file_name().unwrap(), "demo.wav");
        assert_eq!(
            session.merged_target().file_name().unwrap(),
            "demo_with_audio.mp4"
        );
        assert!(session.merged_path.is_none());
    }

    #[test]
    fn test_history_is_newest_first() {
        let mut history = RecordingHistory::new();
        history.push(Session::new(Path::new("/tmp"), "first"));
        history.push(Session::new(Path::new("/tmp"), "second"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.sessions()[0].base_name, "second");
        assert_eq!(history.sessions()[1].base_name, "first");
    }
}
