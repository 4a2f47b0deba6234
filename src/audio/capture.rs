//! Microphone capture using PipeWire
//!
//! Captured audio is accumulated as an ordered list of fixed-size blocks; the
//! blocks are concatenated in arrival order when the recording is flushed to
//! disk. The stream runs at the device's negotiated rate, falling back to
//! 44100 Hz when the format was never reported.

use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Samples per accumulated block
pub const BLOCK_SIZE: usize = 1024;

/// Sample rate used when the stream never reported its format
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Current state of audio capture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Error,
}

/// Shared state for audio capture - thread-safe
#[derive(Clone)]
pub struct SharedCaptureState {
    inner: Arc<Mutex<CaptureStateInner>>,
}

struct CaptureStateInner {
    /// Completed blocks in arrival order (f32 mono, BLOCK_SIZE samples each
    /// except possibly the last)
    blocks: Vec<Vec<f32>>,
    /// Samples waiting to fill the next block
    pending: Vec<f32>,
    /// Negotiated sample rate, 0 until the format callback fired
    sample_rate: u32,
    state: CaptureState,
    error: Option<String>,
}

impl SharedCaptureState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureStateInner {
                blocks: Vec::new(),
                pending: Vec::with_capacity(BLOCK_SIZE),
                sample_rate: 0,
                state: CaptureState::Idle,
                error: None,
            })),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().unwrap().state
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    /// Sample rate the capture ran at, with the 44100 Hz fallback applied
    pub fn sample_rate(&self) -> u32 {
        let rate = self.inner.lock().unwrap().sample_rate;
        if rate == 0 {
            FALLBACK_SAMPLE_RATE
        } else {
            rate
        }
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    pub fn set_state(&self, state: CaptureState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn set_error(&self, error: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.error = Some(error);
        inner.state = CaptureState::Error;
    }

    /// Append incoming samples, slicing them into fixed-size blocks
    pub fn process_samples(&self, samples: &[f32], sample_rate: u32) {
        let mut inner = self.inner.lock().unwrap();
        if sample_rate != 0 {
            inner.sample_rate = sample_rate;
        }
        for &sample in samples {
            inner.pending.push(sample);
            if inner.pending.len() == BLOCK_SIZE {
                let block = std::mem::replace(&mut inner.pending, Vec::with_capacity(BLOCK_SIZE));
                inner.blocks.push(block);
            }
        }
    }

    /// Take all captured blocks, including a trailing partial block
    pub fn take_blocks(&self) -> Vec<Vec<f32>> {
        let mut inner = self.inner.lock().unwrap();
        let mut blocks = std::mem::take(&mut inner.blocks);
        if !inner.pending.is_empty() {
            blocks.push(std::mem::take(&mut inner.pending));
        }
        blocks
    }
}

impl Default for SharedCaptureState {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio capture manager using PipeWire
pub struct AudioCapture {
    state: SharedCaptureState,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<PipeWireCommand>>,
}

enum PipeWireCommand {
    Stop,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            state: SharedCaptureState::new(),
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            sender: None,
        }
    }

    /// Get shared capture state for progress and error observation
    pub fn shared_state(&self) -> SharedCaptureState {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Start capturing audio on a background thread
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err("Capture already running".to_string());
        }

        self.state.set_state(CaptureState::Capturing);
        self.is_running.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let is_running = self.is_running.clone();

        // Create channel for stopping the loop
        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        self.sender = Some(sender);

        let handle = thread::spawn(move || {
            if let Err(e) = run_capture_loop(state.clone(), receiver) {
                state.set_error(e);
            }
            is_running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing and return the accumulated blocks with their rate
    ///
    /// Blocks captured before a mid-stream error are still returned so the
    /// caller can decide whether to flush them.
    pub fn stop(&mut self) -> (Vec<Vec<f32>>, u32) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PipeWireCommand::Stop);
        }

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.is_running.store(false, Ordering::SeqCst);
        if self.state.state() == CaptureState::Capturing {
            self.state.set_state(CaptureState::Idle);
        }

        (self.state.take_blocks(), self.state.sample_rate())
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.is_running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    state: SharedCaptureState,
    receiver: pw::channel::Receiver<PipeWireCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedCaptureState,
    }

    let user_data = UserData {
        format: Default::default(),
        state: state.clone(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Production",
        *pw::keys::APP_NAME => "Camrec",
    };

    let stream = pw::stream::StreamBox::new(&core, "camrec-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if user_data.format.parse(param).is_err() {
                user_data
                    .state
                    .set_error("Failed to parse audio format".to_string());
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1);
            let sample_rate = user_data.format.rate();
            let n_samples = data.chunk().size() / (std::mem::size_of::<f32>() as u32);

            if let Some(raw_samples) = data.data() {
                // Convert bytes to f32 samples, taking the first channel
                let mut mono_samples = Vec::with_capacity((n_samples / n_channels) as usize);

                for i in (0..n_samples).step_by(n_channels as usize) {
                    let start = i as usize * std::mem::size_of::<f32>();
                    let end = start + std::mem::size_of::<f32>();
                    if end <= raw_samples.len() {
                        let sample =
                            f32::from_le_bytes(raw_samples[start..end].try_into().unwrap_or([0; 4]));
                        mono_samples.push(sample);
                    }
                }

                user_data.state.process_samples(&mono_samples, sample_rate);
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Request F32LE at the device's native rate
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let mut params = [Pod::from_bytes(&values).unwrap()];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped
    mainloop.run();

    Ok(())
}

/// Calculate RMS volume from samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_fixed_size_in_arrival_order() {
        let state = SharedCaptureState::new();
        let first: Vec<f32> = (0..BLOCK_SIZE).map(|i| i as f32).collect();
        let second = vec![-1.0f32; 100];
        state.process_samples(&first, 48000);
        state.process_samples(&second, 48000);

        let blocks = state.take_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), BLOCK_SIZE);
        assert_eq!(blocks[0][1], 1.0);
        assert_eq!(blocks[1], second);
        assert_eq!(state.sample_rate(), 48000);
    }

    #[test]
    fn test_sample_rate_falls_back_when_unreported() {
        let state = SharedCaptureState::new();
        state.process_samples(&[0.0, 0.0], 0);
        assert_eq!(state.sample_rate(), FALLBACK_SAMPLE_RATE);
    }

    #[test]
    fn test_take_blocks_includes_partial_tail() {
        let state = SharedCaptureState::new();
        state.process_samples(&vec![0.5f32; BLOCK_SIZE + 10], 44100);
        let blocks = state.take_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].len(), 10);
        // A second take returns nothing
        assert!(state.take_blocks().is_empty());
    }

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(calculate_rms(&[]), 0.0);
        assert_eq!(calculate_rms(&[0.0, 0.0]), 0.0);
    }
}
