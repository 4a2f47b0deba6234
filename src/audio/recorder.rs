//! WAV file writing using hound
//!
//! Flushes the capture task's accumulated blocks to a mono 32-bit float WAV
//! at the rate the capture stream negotiated.

use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// WAV file recorder
pub struct WavRecorder {
    spec: WavSpec,
}

impl WavRecorder {
    /// Create a recorder writing mono f32 at the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            spec: WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    /// Write the blocks to `path` as one concatenated stream
    ///
    /// Blocks are written in the order given; no reordering or realignment
    /// happens here.
    pub fn save_blocks(&self, blocks: &[Vec<f32>], path: &Path) -> Result<PathBuf, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create output directory: {}", e))?;
        }

        let file = File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
        let writer = BufWriter::new(file);
        let mut wav_writer = WavWriter::new(writer, self.spec)
            .map_err(|e| format!("Failed to create WAV writer: {}", e))?;

        for block in blocks {
            for &sample in block {
                wav_writer
                    .write_sample(sample)
                    .map_err(|e| format!("Failed to write sample: {}", e))?;
            }
        }

        wav_writer
            .finalize()
            .map_err(|e| format!("Failed to finalize WAV file: {}", e))?;

        Ok(path.to_path_buf())
    }

    /// Load samples from a WAV file
    ///
    /// Returns the samples and sample rate
    pub fn load(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32), String> {
        let reader = hound::WavReader::open(path.as_ref())
            .map_err(|e| format!("Failed to open WAV file: {}", e))?;

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;

        let samples: Result<Vec<f32>, _> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let bits = spec.bits_per_sample;
                let max_value = (1 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_value))
                    .collect()
            }
        };

        let samples = samples.map_err(|e| format!("Failed to read samples: {}", e))?;

        Ok((samples, sample_rate))
    }

    /// Get duration of samples in seconds
    pub fn duration_seconds(sample_count: usize, sample_rate: u32) -> f64 {
        sample_count as f64 / sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camrec_recorder_{}_{}.wav", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_duration_calculation() {
        assert_eq!(WavRecorder::duration_seconds(44100, 44100), 1.0);
        assert_eq!(WavRecorder::duration_seconds(88200, 44100), 2.0);
        assert_eq!(WavRecorder::duration_seconds(22050, 44100), 0.5);
    }

    #[test]
    fn test_saved_wav_is_block_concatenation() {
        let blocks = vec![vec![0.1f32, 0.2], vec![0.3], vec![-0.4, -0.5, -0.6]];
        let path = temp_wav("concat");

        let recorder = WavRecorder::new(44100);
        recorder.save_blocks(&blocks, &path).unwrap();

        let (samples, rate) = WavRecorder::load(&path).unwrap();
        assert_eq!(rate, 44100);
        let expected: Vec<f32> = blocks.into_iter().flatten().collect();
        assert_eq!(samples, expected);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sample_rate_is_preserved() {
        let path = temp_wav("rate");
        let recorder = WavRecorder::new(48000);
        recorder.save_blocks(&[vec![0.0f32; 16]], &path).unwrap();
        let (_, rate) = WavRecorder::load(&path).unwrap();
        assert_eq!(rate, 48000);
        let _ = std::fs::remove_file(&path);
    }
}
