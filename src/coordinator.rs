//! Capture coordinator
//!
//! Owns the session lifecycle: one cancel token per session, the detached
//! video / audio / voice-stop tasks, the bounded joins on stop, and the
//! synchronous finalize step that verifies both capture files and hands them
//! to the external merge tool. At most one session records at a time, and a
//! session's merged file always comes from that session's own capture files.

use crate::audio;
use crate::cancel::{CancelToken, FaultSlot};
use crate::models::{RecordConfig, RecordingHistory, Session};
use crate::mux::{self, Muxer, MuxError};
use crate::settings::Settings;
use crate::speech::{self, SpeechBackend};
use crate::video::{self, FramePreview};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Ceiling for waiting on each capture task during stop
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of the finalize step after both capture tasks stopped
#[derive(Debug)]
pub enum MergeOutcome {
    /// Merge succeeded; the path is the session's merged file
    Merged(PathBuf),
    /// A capture task reported a device or write failure; whatever was
    /// flushed stays on disk but is never merged
    CaptureFailed(String),
    /// Capture failed: this file never became ready, merge was not attempted
    NotAttempted(PathBuf),
    /// External tool unavailable; raw capture files remain usable
    SkippedToolMissing,
    /// The tool ran and failed; raw files are untouched
    Failed(MuxError),
}

/// What `stop()` reports to the caller
#[derive(Debug)]
pub struct StopReport {
    pub session: Session,
    pub outcome: MergeOutcome,
}

struct ActiveSession {
    session: Session,
    config: RecordConfig,
    token: CancelToken,
    fault: FaultSlot,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

/// Owner of the recording pipeline state
pub struct Coordinator {
    settings: Settings,
    active: Option<ActiveSession>,
    history: RecordingHistory,
    join_timeout: Duration,
    ready_timeout: Duration,
}

impl Coordinator {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            active: None,
            history: RecordingHistory::new(),
            join_timeout: JOIN_TIMEOUT,
            ready_timeout: mux::READY_TIMEOUT,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Whether any task has requested a stop for the active session
    pub fn stop_requested(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.token.is_set())
            .unwrap_or(false)
    }

    pub fn history(&self) -> &RecordingHistory {
        &self.history
    }

    /// Start a new session
    ///
    /// Rejected without side effects while another session is active: no
    /// directory is created and no task is launched. Otherwise the capture
    /// tasks are spawned detached and this returns immediately.
    pub fn start(
        &mut self,
        config: RecordConfig,
        preview: Option<Box<dyn FramePreview + Send>>,
    ) -> Result<Session, String> {
        if self.active.is_some() {
            warn!("Start rejected: already recording");
            return Err("already recording".to_string());
        }

        let session = Session::new(&config.save_dir, &config.base_name);
        std::fs::create_dir_all(&session.output_dir)
            .map_err(|e| format!("Failed to create session directory: {}", e))?;
        info!("Recording session started in {}", session.output_dir.display());

        let token = CancelToken::new();
        let fault = FaultSlot::new();
        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::with_capacity(3);

        if config.show_preview && preview.is_none() {
            debug!("Preview requested but no preview surface installed");
        }

        {
            let task_token = token.clone();
            let task_fault = fault.clone();
            let path = session.video_path.clone();
            let (camera_index, fps) = (config.camera_index, config.fps);
            let preview = if config.show_preview { preview } else { None };
            let handle = thread::Builder::new()
                .name("camrec-video".to_string())
                .spawn(move || {
                    video::run_capture_task(task_token, task_fault, camera_index, fps, path, preview)
                });
            match handle {
                Ok(handle) => tasks.push(("video", handle)),
                Err(e) => {
                    abort_start(&token, tasks, self.join_timeout);
                    return Err(format!("Failed to spawn video task: {}", e));
                }
            }
        }

        {
            let task_token = token.clone();
            let task_fault = fault.clone();
            let path = session.audio_path.clone();
            let handle = thread::Builder::new()
                .name("camrec-audio".to_string())
                .spawn(move || audio::run_capture_task(task_token, task_fault, path));
            match handle {
                Ok(handle) => tasks.push(("audio", handle)),
                Err(e) => {
                    abort_start(&token, tasks, self.join_timeout);
                    return Err(format!("Failed to spawn audio task: {}", e));
                }
            }
        }

        // Capability check happens once per session; Unavailable is not an
        // error, the listener just does not run.
        match SpeechBackend::detect(&self.settings) {
            SpeechBackend::Available(recognizer) => {
                let task_token = token.clone();
                let phrase = config.stop_phrase.clone();
                let handle = thread::Builder::new()
                    .name("camrec-voice-stop".to_string())
                    .spawn(move || speech::run_voice_stop_task(task_token, recognizer, phrase));
                match handle {
                    Ok(handle) => tasks.push(("voice-stop", handle)),
                    Err(e) => {
                        abort_start(&token, tasks, self.join_timeout);
                        return Err(format!("Failed to spawn voice-stop task: {}", e));
                    }
                }
            }
            SpeechBackend::Unavailable => {
                debug!("Voice-stop listener not launched: speech backend unavailable");
            }
        }

        self.active = Some(ActiveSession {
            session: session.clone(),
            config,
            token,
            fault,
            tasks,
        });
        Ok(session)
    }

    /// Stop the active session and finalize it
    ///
    /// Sets the cancel token, waits for each task bounded by a fixed
    /// timeout, then verifies the capture files and merges them. Only a
    /// successfully merged session is appended to the history.
    pub fn stop(&mut self) -> Result<StopReport, String> {
        let active = self.active.take().ok_or_else(|| {
            debug!("Stop ignored: no active recording");
            "no active recording".to_string()
        })?;

        active.token.set();
        for (name, handle) in active.tasks {
            join_bounded(name, handle, self.join_timeout);
        }

        let mut session = active.session;
        let outcome = self.finalize(&mut session, active.config.shortest, &active.fault);
        Ok(StopReport { session, outcome })
    }

    fn finalize(&mut self, session: &mut Session, shortest: bool, fault: &FaultSlot) -> MergeOutcome {
        // A reported task failure outranks file readiness: a truncated take
        // may look complete on disk but must not be presented as a success.
        if let Some(message) = fault.get() {
            warn!("Capture reported a failure, merge not attempted: {}", message);
            return MergeOutcome::CaptureFailed(message);
        }

        for path in [&session.video_path, &session.audio_path] {
            if !mux::wait_for_file(path, self.ready_timeout) {
                warn!("Capture file never became ready: {}", path.display());
                return MergeOutcome::NotAttempted(path.clone());
            }
        }

        let muxer = match Muxer::resolve(self.settings.tool_path.as_deref()) {
            Ok(muxer) => muxer,
            Err(MuxError::ToolNotFound) => {
                warn!("Media tool not found; capture files kept unmerged");
                return MergeOutcome::SkippedToolMissing;
            }
            Err(e) => return MergeOutcome::Failed(e),
        };

        match muxer.merge(&session.video_path, &session.audio_path, shortest) {
            Ok(merged) => {
                session.merged_path = Some(merged.clone());
                self.history.push(session.clone());
                MergeOutcome::Merged(merged)
            }
            Err(e) => {
                warn!("Merge failed: {}", e);
                MergeOutcome::Failed(e)
            }
        }
    }
}

/// Wind down already-launched tasks when a later spawn fails mid-start
///
/// Without this, a failed `start` would leave earlier tasks recording into a
/// session nobody owns, with a token nobody will ever set.
fn abort_start(token: &CancelToken, tasks: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    token.set();
    for (name, handle) in tasks {
        join_bounded(name, handle, timeout);
    }
}

/// Wait for a task up to `timeout`, then give up and proceed
///
/// Capture tasks only observe cancellation between device calls, so a task
/// stuck inside one may outlive the bound; the finalize readiness poll
/// absorbs the resulting flush lag.
fn join_bounded(name: &str, handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{} task did not confirm exit within {:?}, proceeding", name, timeout);
            return;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    let _ = handle.join();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("camrec_coord_{}_{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn fast_coordinator(settings: Settings) -> Coordinator {
        let mut coordinator = Coordinator::new(settings);
        coordinator.join_timeout = Duration::from_millis(100);
        coordinator.ready_timeout = Duration::from_millis(100);
        coordinator
    }

    fn dummy_active(save_dir: &Path) -> ActiveSession {
        let session = Session::new(save_dir, "busy");
        ActiveSession {
            session,
            config: RecordConfig::default(),
            token: CancelToken::new(),
            fault: FaultSlot::new(),
            tasks: vec![("video", thread::spawn(|| {}))],
        }
    }

    /// A fake external tool: a script that exits with the given status
    fn fake_tool(dir: &Path, exit_code: i32) -> PathBuf {
        let path = dir.join("fake-tool");
        std::fs::write(&path, format!("#!/bin/sh\nexit {}\n", exit_code)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn ready_session(dir: &Path) -> Session {
        let mut session = Session::new(dir, "take");
        session.output_dir = dir.to_path_buf();
        session.video_path = dir.join("take.mp4");
        session.audio_path = dir.join("take.wav");
        std::fs::write(&session.video_path, b"video").unwrap();
        std::fs::write(&session.audio_path, b"audio").unwrap();
        session
    }

    #[test]
    fn test_second_start_is_rejected_without_side_effects() {
        let save_dir = temp_dir("reject");
        let mut coordinator = fast_coordinator(Settings::default());
        coordinator.active = Some(dummy_active(&save_dir));

        let config = RecordConfig {
            save_dir: save_dir.clone(),
            base_name: "second".to_string(),
            ..RecordConfig::default()
        };
        assert!(coordinator.start(config, None).is_err());

        // No session directory was created for the rejected start
        let entries: Vec<_> = std::fs::read_dir(&save_dir).unwrap().collect();
        assert!(entries.is_empty());

        let _ = std::fs::remove_dir_all(&save_dir);
    }

    #[test]
    fn test_stop_without_session_is_an_error() {
        let mut coordinator = fast_coordinator(Settings::default());
        assert!(coordinator.stop().is_err());
        assert!(!coordinator.is_recording());
    }

    #[test]
    fn test_stop_reports_capture_failure_when_files_missing() {
        let save_dir = temp_dir("notready");
        let mut coordinator = fast_coordinator(Settings::default());
        coordinator.active = Some(dummy_active(&save_dir));

        let report = coordinator.stop().unwrap();
        match report.outcome {
            MergeOutcome::NotAttempted(path) => {
                assert_eq!(path, report.session.video_path);
            }
            other => panic!("expected NotAttempted, got {:?}", other),
        }
        assert!(report.session.merged_path.is_none());
        assert!(coordinator.history().is_empty());

        let _ = std::fs::remove_dir_all(&save_dir);
    }

    #[test]
    fn test_successful_merge_sets_path_and_appends_history() {
        let dir = temp_dir("merged");
        let tool = fake_tool(&dir, 0);
        let settings = Settings {
            tool_path: Some(tool),
            ..Settings::default()
        };
        let mut coordinator = fast_coordinator(settings);
        let mut session = ready_session(&dir);

        match coordinator.finalize(&mut session, true, &FaultSlot::new()) {
            MergeOutcome::Merged(merged) => {
                assert_eq!(merged.file_name().unwrap(), "take_with_audio.mp4");
                assert_eq!(session.merged_path.as_deref(), Some(merged.as_path()));
            }
            other => panic!("expected Merged, got {:?}", other),
        }
        assert_eq!(coordinator.history().len(), 1);
        assert!(coordinator.history().sessions()[0].merged_path.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_merge_leaves_history_and_session_untouched() {
        let dir = temp_dir("failed");
        let tool = fake_tool(&dir, 2);
        let settings = Settings {
            tool_path: Some(tool),
            ..Settings::default()
        };
        let mut coordinator = fast_coordinator(settings);
        let mut session = ready_session(&dir);

        match coordinator.finalize(&mut session, true, &FaultSlot::new()) {
            MergeOutcome::Failed(MuxError::ToolFailed { code, .. }) => assert_eq!(code, 2),
            other => panic!("expected ToolFailed, got {:?}", other),
        }
        assert!(session.merged_path.is_none());
        assert!(coordinator.history().is_empty());
        // Raw capture files remain on disk
        assert!(session.video_path.exists());
        assert!(session.audio_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reported_fault_blocks_merge_despite_ready_files() {
        let dir = temp_dir("fault");
        let tool = fake_tool(&dir, 0);
        let settings = Settings {
            tool_path: Some(tool),
            ..Settings::default()
        };
        let mut coordinator = fast_coordinator(settings);
        // Both capture files exist and are non-empty, as after a mid-stream
        // device error that still flushed a partial take
        let mut session = ready_session(&dir);
        let fault = FaultSlot::new();
        fault.report("audio capture errored mid-stream: device gone".to_string());

        match coordinator.finalize(&mut session, true, &fault) {
            MergeOutcome::CaptureFailed(message) => {
                assert!(message.contains("device gone"));
            }
            other => panic!("expected CaptureFailed, got {:?}", other),
        }
        assert!(session.merged_path.is_none());
        assert!(coordinator.history().is_empty());
        // The partial files stay on disk for salvage
        assert!(session.video_path.exists());
        assert!(session.audio_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stop_surfaces_task_reported_fault() {
        let save_dir = temp_dir("faultstop");
        let mut coordinator = fast_coordinator(Settings::default());
        let active = dummy_active(&save_dir);
        std::fs::create_dir_all(&active.session.output_dir).unwrap();
        std::fs::write(&active.session.video_path, b"frames").unwrap();
        std::fs::write(&active.session.audio_path, b"samples").unwrap();
        active.fault.report("microphone disappeared".to_string());
        coordinator.active = Some(active);

        let report = coordinator.stop().unwrap();
        match report.outcome {
            MergeOutcome::CaptureFailed(message) => {
                assert!(message.contains("microphone disappeared"));
            }
            other => panic!("expected CaptureFailed, got {:?}", other),
        }
        assert!(coordinator.history().is_empty());

        let _ = std::fs::remove_dir_all(&save_dir);
    }

    #[test]
    fn test_abort_start_stops_already_launched_tasks() {
        let token = CancelToken::new();
        let task_token = token.clone();
        let handle = thread::spawn(move || {
            while !task_token.is_set() {
                thread::sleep(Duration::from_millis(5));
            }
        });

        abort_start(&token, vec![("video", handle)], Duration::from_secs(1));
        assert!(token.is_set());
    }

    #[test]
    fn test_join_bounded_gives_up_on_stuck_task() {
        let started = Instant::now();
        let handle = thread::spawn(|| thread::sleep(Duration::from_secs(5)));
        join_bounded("stuck", handle, Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
