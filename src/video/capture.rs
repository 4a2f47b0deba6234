//! Webcam capture using v4l2
//!
//! Grabs frames from `/dev/video<N>` and appends them to the session's video
//! container at the target rate. MJPG cameras are written passthrough; YUYV
//! frames are JPEG-encoded first. The task runs detached and reports failure
//! only by setting the shared cancel token.

use crate::cancel::{CancelToken, FaultSlot};
use crate::video::writer::VideoWriter;
use crate::video::FramePreview;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use v4l::buffer::Type as BufType;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const JPEG_QUALITY: u8 = 80;
const STREAM_BUFFERS: u32 = 4;

/// Pixel layouts the capture loop knows how to turn into JPEG frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameFormat {
    Mjpg,
    Yuyv,
}

/// Video capture task: read frames until the token is set and write them to
/// `output_path`
///
/// Runs detached; failures set the token and land in the session's fault
/// slot. A frame read failure ends the loop quietly (end-of-stream). The
/// camera handle and the container writer are released on every exit path.
pub fn run_capture_task(
    token: CancelToken,
    fault: FaultSlot,
    camera_index: u32,
    fps: u32,
    output_path: PathBuf,
    mut preview: Option<Box<dyn FramePreview + Send>>,
) {
    let device = match Device::new(camera_index as usize) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open camera {}: {}", camera_index, e);
            fault.report(format!("failed to open camera {}: {}", camera_index, e));
            token.set();
            return;
        }
    };

    let (format, width, height) = match negotiate_format(&device) {
        Ok(negotiated) => negotiated,
        Err(e) => {
            error!("Camera {}: {}", camera_index, e);
            fault.report(format!("camera {}: {}", camera_index, e));
            token.set();
            return;
        }
    };

    // Best effort; many UVC cameras ignore the requested interval anyway
    let params = v4l::video::capture::Parameters::with_fps(fps);
    if let Err(e) = device.set_params(&params) {
        debug!("Camera {} did not accept {} fps: {}", camera_index, fps, e);
    }

    let mut writer = match VideoWriter::new(&output_path, width, height, fps) {
        Ok(writer) => writer,
        Err(e) => {
            error!("{}", e);
            fault.report(e);
            token.set();
            return;
        }
    };

    let mut stream = match MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
    {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to start camera stream: {}", e);
            fault.report(format!("failed to start camera stream: {}", e));
            token.set();
            return;
        }
    };

    info!(
        "Video capture running: camera {} {}x{} {:?} at {} fps",
        camera_index, width, height, format, fps
    );

    while !token.is_set() {
        let (buf, _meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) => {
                // End of stream, not necessarily an error
                debug!("Camera read ended: {}", e);
                break;
            }
        };
        if buf.is_empty() {
            continue;
        }

        let jpeg = match format {
            FrameFormat::Mjpg => buf.to_vec(),
            FrameFormat::Yuyv => match encode_yuyv_frame(buf, width, height) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("Skipping frame: {}", e);
                    continue;
                }
            },
        };

        if let Some(surface) = preview.as_deref_mut() {
            if !surface.show_frame(&jpeg, width, height) {
                info!("Preview closed, requesting stop");
                token.set();
            }
        }

        if let Err(e) = writer.write_frame(&jpeg) {
            error!("{}", e);
            fault.report(e);
            token.set();
            break;
        }
    }

    // Release the camera before sealing the container
    drop(stream);
    drop(device);

    let frames = writer.frame_count();
    match writer.finalize() {
        Ok(path) => info!("Video track written: {} frames to {}", frames, path.display()),
        Err(e) => {
            error!("{}", e);
            fault.report(e);
            token.set();
        }
    }
}

/// Pick a capture format the writer understands, preferring MJPG
fn negotiate_format(device: &Device) -> Result<(FrameFormat, u32, u32), String> {
    let mut fmt = device
        .format()
        .map_err(|e| format!("failed to query format: {}", e))?;
    fmt.fourcc = FourCC::new(b"MJPG");
    let fmt = device
        .set_format(&fmt)
        .map_err(|e| format!("failed to set format: {}", e))?;

    let format = match &fmt.fourcc.repr {
        b"MJPG" => FrameFormat::Mjpg,
        b"YUYV" => FrameFormat::Yuyv,
        other => {
            return Err(format!(
                "unsupported pixel format {}",
                String::from_utf8_lossy(other)
            ))
        }
    };
    Ok((format, fmt.width, fmt.height))
}

/// JPEG-encode one packed YUYV 4:2:2 frame
fn encode_yuyv_frame(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let rgb = yuyv_to_rgb(yuyv, width, height)?;
    let mut jpeg = Vec::with_capacity((width * height / 3) as usize);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode(&rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| format!("jpeg encode failed: {}", e))?;
    Ok(jpeg)
}

fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, String> {
    let (w, h) = (width as usize, height as usize);
    if yuyv.len() < w * h * 2 || w % 2 != 0 {
        return Err(format!(
            "short YUYV frame: {} bytes for {}x{}",
            yuyv.len(),
            w,
            h
        ));
    }

    let clamp = |v: i32| -> u8 { v.clamp(0, 255) as u8 };
    let mut rgb = vec![0u8; w * h * 3];
    let mut i = 0;
    for y in 0..h {
        for x in (0..w).step_by(2) {
            let y0 = yuyv[i] as i32;
            let u = yuyv[i + 1] as i32 - 128;
            let y1 = yuyv[i + 2] as i32;
            let v = yuyv[i + 3] as i32 - 128;
            i += 4;

            let idx0 = (y * w + x) * 3;
            let idx1 = idx0 + 3;
            rgb[idx0] = clamp((298 * (y0 - 16) + 409 * v + 128) >> 8);
            rgb[idx0 + 1] = clamp((298 * (y0 - 16) - 100 * u - 208 * v + 128) >> 8);
            rgb[idx0 + 2] = clamp((298 * (y0 - 16) + 516 * u + 128) >> 8);
            rgb[idx1] = clamp((298 * (y1 - 16) + 409 * v + 128) >> 8);
            rgb[idx1 + 1] = clamp((298 * (y1 - 16) - 100 * u - 208 * v + 128) >> 8);
            rgb[idx1 + 2] = clamp((298 * (y1 - 16) + 516 * u + 128) >> 8);
        }
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_maps_to_gray_rgb() {
        // Y=128, U=V=128 is mid gray
        let yuyv = vec![128u8; 2 * 2 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 2, 2).unwrap();
        assert_eq!(rgb.len(), 2 * 2 * 3);
        for &c in &rgb {
            assert!((125..=135).contains(&c), "channel {} not gray", c);
        }
    }

    #[test]
    fn test_yuyv_rejects_short_buffer() {
        assert!(yuyv_to_rgb(&[0u8; 10], 640, 480).is_err());
    }

    #[test]
    fn test_encode_yuyv_produces_jpeg_magic() {
        let yuyv = vec![128u8; 4 * 4 * 2];
        let jpeg = encode_yuyv_frame(&yuyv, 4, 4).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }
}
