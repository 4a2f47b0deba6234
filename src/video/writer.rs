//! Minimal RIFF/AVI muxer for an MJPG video stream
//!
//! Frames are appended in capture order as `00dc` chunks; sizes, the frame
//! count, and the `idx1` index are patched in when the writer is finalized.
//! The container is self-contained so raw capture never depends on the
//! external merge tool.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// Fixed layout offsets for the header fields patched on finalize
const RIFF_SIZE_POS: u64 = 4;
const TOTAL_FRAMES_POS: u64 = 48;
const STREAM_LENGTH_POS: u64 = 140;
const MOVI_SIZE_POS: u64 = 216;
const MOVI_FOURCC_POS: u64 = 220;

const AVIF_HASINDEX: u32 = 0x0000_0010;
const AVIIF_KEYFRAME: u32 = 0x0000_0010;

/// Growing AVI/MJPG container file
pub struct VideoWriter {
    file: Option<BufWriter<File>>,
    path: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    /// (offset of the chunk fourcc relative to the `movi` fourcc, data size)
    index: Vec<(u32, u32)>,
    /// Bytes written inside the movi list, including the list type fourcc
    movi_bytes: u32,
    finalized: bool,
}

impl VideoWriter {
    /// Create the container and write its provisional headers
    pub fn new(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create output directory: {}", e))?;
        }
        let file = File::create(path)
            .map_err(|e| format!("Failed to create video file {}: {}", path.display(), e))?;
        let mut writer = Self {
            file: Some(BufWriter::new(file)),
            path: path.to_path_buf(),
            width,
            height,
            fps: fps.max(1),
            index: Vec::new(),
            movi_bytes: 4,
            finalized: false,
        };
        writer.write_headers()?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u32 {
        self.index.len() as u32
    }

    fn out(&mut self) -> &mut BufWriter<File> {
        // Only None after finalize, which consumes the writer
        self.file.as_mut().expect("writer already finalized")
    }

    fn write_headers(&mut self) -> Result<(), String> {
        let (width, height, fps) = (self.width, self.height, self.fps);
        let mut header = Vec::with_capacity(224);

        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&0u32.to_le_bytes()); // patched
        header.extend_from_slice(b"AVI ");

        // hdrl list: avih + one strl
        header.extend_from_slice(b"LIST");
        header.extend_from_slice(&192u32.to_le_bytes());
        header.extend_from_slice(b"hdrl");

        header.extend_from_slice(b"avih");
        header.extend_from_slice(&56u32.to_le_bytes());
        header.extend_from_slice(&(1_000_000 / fps).to_le_bytes()); // usec per frame
        header.extend_from_slice(&0u32.to_le_bytes()); // max bytes per sec
        header.extend_from_slice(&0u32.to_le_bytes()); // padding granularity
        header.extend_from_slice(&AVIF_HASINDEX.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes()); // total frames, patched
        header.extend_from_slice(&0u32.to_le_bytes()); // initial frames
        header.extend_from_slice(&1u32.to_le_bytes()); // streams
        header.extend_from_slice(&0u32.to_le_bytes()); // suggested buffer size
        header.extend_from_slice(&width.to_le_bytes());
        header.extend_from_slice(&height.to_le_bytes());
        header.extend_from_slice(&[0u8; 16]); // reserved

        header.extend_from_slice(b"LIST");
        header.extend_from_slice(&116u32.to_le_bytes());
        header.extend_from_slice(b"strl");

        header.extend_from_slice(b"strh");
        header.extend_from_slice(&56u32.to_le_bytes());
        header.extend_from_slice(b"vids");
        header.extend_from_slice(b"MJPG");
        header.extend_from_slice(&0u32.to_le_bytes()); // flags
        header.extend_from_slice(&0u16.to_le_bytes()); // priority
        header.extend_from_slice(&0u16.to_le_bytes()); // language
        header.extend_from_slice(&0u32.to_le_bytes()); // initial frames
        header.extend_from_slice(&1u32.to_le_bytes()); // scale
        header.extend_from_slice(&fps.to_le_bytes()); // rate
        header.extend_from_slice(&0u32.to_le_bytes()); // start
        header.extend_from_slice(&0u32.to_le_bytes()); // length, patched
        header.extend_from_slice(&0u32.to_le_bytes()); // suggested buffer size
        header.extend_from_slice(&u32::MAX.to_le_bytes()); // quality
        header.extend_from_slice(&0u32.to_le_bytes()); // sample size
        header.extend_from_slice(&0u16.to_le_bytes()); // rcFrame left
        header.extend_from_slice(&0u16.to_le_bytes()); // top
        header.extend_from_slice(&(width as u16).to_le_bytes()); // right
        header.extend_from_slice(&(height as u16).to_le_bytes()); // bottom

        header.extend_from_slice(b"strf");
        header.extend_from_slice(&40u32.to_le_bytes());
        header.extend_from_slice(&40u32.to_le_bytes()); // biSize
        header.extend_from_slice(&width.to_le_bytes());
        header.extend_from_slice(&height.to_le_bytes());
        header.extend_from_slice(&1u16.to_le_bytes()); // planes
        header.extend_from_slice(&24u16.to_le_bytes()); // bit count
        header.extend_from_slice(b"MJPG"); // compression
        header.extend_from_slice(&(width * height * 3).to_le_bytes()); // size image
        header.extend_from_slice(&[0u8; 16]); // resolution, clr fields

        header.extend_from_slice(b"LIST");
        header.extend_from_slice(&0u32.to_le_bytes()); // movi size, patched
        header.extend_from_slice(b"movi");

        debug_assert_eq!(header.len() as u64, MOVI_FOURCC_POS + 4);

        self.out()
            .write_all(&header)
            .map_err(|e| format!("Failed to write AVI header: {}", e))
    }

    /// Append one JPEG-encoded frame
    pub fn write_frame(&mut self, jpeg: &[u8]) -> Result<(), String> {
        let size = jpeg.len() as u32;
        let offset = self.movi_bytes;

        let out = self.out();
        out.write_all(b"00dc")
            .and_then(|_| out.write_all(&size.to_le_bytes()))
            .and_then(|_| out.write_all(jpeg))
            .map_err(|e| format!("Failed to write frame: {}", e))?;
        // RIFF chunks are word-aligned
        if size % 2 == 1 {
            out.write_all(&[0u8])
                .map_err(|e| format!("Failed to write frame padding: {}", e))?;
        }

        self.movi_bytes += 8 + size + (size % 2);
        self.index.push((offset, size));
        Ok(())
    }

    /// Write the index and patch the provisional header fields
    pub fn finalize(mut self) -> Result<PathBuf, String> {
        let frames = self.index.len() as u32;
        let movi_bytes = self.movi_bytes;
        let index = std::mem::take(&mut self.index);

        {
            let out = self.out();

            out.write_all(b"idx1")
                .and_then(|_| out.write_all(&(index.len() as u32 * 16).to_le_bytes()))
                .map_err(|e| format!("Failed to write index: {}", e))?;
            for (offset, size) in &index {
                out.write_all(b"00dc")
                    .and_then(|_| out.write_all(&AVIIF_KEYFRAME.to_le_bytes()))
                    .and_then(|_| out.write_all(&offset.to_le_bytes()))
                    .and_then(|_| out.write_all(&size.to_le_bytes()))
                    .map_err(|e| format!("Failed to write index entry: {}", e))?;
            }

            let file_len = out
                .stream_position()
                .map_err(|e| format!("Failed to measure video file: {}", e))?;

            let patches: [(u64, u32); 4] = [
                (RIFF_SIZE_POS, (file_len - 8) as u32),
                (TOTAL_FRAMES_POS, frames),
                (STREAM_LENGTH_POS, frames),
                (MOVI_SIZE_POS, movi_bytes),
            ];
            for (pos, value) in patches {
                out.seek(SeekFrom::Start(pos))
                    .and_then(|_| out.write_all(&value.to_le_bytes()))
                    .map_err(|e| format!("Failed to patch AVI header: {}", e))?;
            }
            out.flush()
                .map_err(|e| format!("Failed to flush video file: {}", e))?;
        }

        self.finalized = true;
        self.file = None;
        Ok(self.path.clone())
    }

    // Index entry offsets are relative to the movi fourcc; the first frame
    // therefore sits at offset 4.
    #[cfg(test)]
    fn movi_fourcc_pos() -> u64 {
        MOVI_FOURCC_POS
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        // On unwind paths the header stays unpatched, but flushing keeps the
        // already-captured frames on disk.
        if !self.finalized {
            if let Some(mut out) = self.file.take() {
                let _ = out.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_avi(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("camrec_writer_{}_{}.avi", tag, uuid::Uuid::new_v4()))
    }

    fn read_u32(bytes: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap())
    }

    #[test]
    fn test_header_identifies_mjpg_avi() {
        let path = temp_avi("header");
        let writer = VideoWriter::new(&path, 640, 480, 30).unwrap();
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(&bytes[100..104], b"strh");
        assert_eq!(&bytes[108..112], b"vids");
        assert_eq!(&bytes[112..116], b"MJPG");
        assert_eq!(&bytes[220..224], b"movi");
        // usec per frame for 30 fps
        assert_eq!(read_u32(&bytes, 32), 33333);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_frame_count_and_sizes_are_patched() {
        let path = temp_avi("patch");
        let mut writer = VideoWriter::new(&path, 320, 240, 15).unwrap();
        // Odd-sized frame exercises the padding path
        writer.write_frame(&[0xFFu8; 101]).unwrap();
        writer.write_frame(&[0xD8u8; 200]).unwrap();
        writer.write_frame(&[0x01u8; 50]).unwrap();
        assert_eq!(writer.frame_count(), 3);
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(read_u32(&bytes, TOTAL_FRAMES_POS as usize), 3);
        assert_eq!(read_u32(&bytes, STREAM_LENGTH_POS as usize), 3);
        assert_eq!(read_u32(&bytes, RIFF_SIZE_POS as usize) as usize, bytes.len() - 8);
        // movi = 'movi' + three chunks, odd one padded
        let expected_movi = 4 + (8 + 102) + (8 + 200) + (8 + 50);
        assert_eq!(read_u32(&bytes, MOVI_SIZE_POS as usize), expected_movi);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_index_points_at_first_frame() {
        let path = temp_avi("index");
        let mut writer = VideoWriter::new(&path, 320, 240, 30).unwrap();
        writer.write_frame(&[0xAB; 10]).unwrap();
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let movi = VideoWriter::movi_fourcc_pos() as usize;
        // First chunk directly after the movi fourcc
        assert_eq!(&bytes[movi + 4..movi + 8], b"00dc");

        let idx1 = bytes.windows(4).position(|w| w == b"idx1").unwrap();
        assert_eq!(read_u32(&bytes, idx1 + 4), 16); // one entry
        assert_eq!(&bytes[idx1 + 8..idx1 + 12], b"00dc");
        assert_eq!(read_u32(&bytes, idx1 + 16), 4); // offset from movi fourcc
        assert_eq!(read_u32(&bytes, idx1 + 20), 10); // unpadded size

        let _ = std::fs::remove_file(&path);
    }
}
