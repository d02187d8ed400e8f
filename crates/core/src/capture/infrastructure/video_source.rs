use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::capture::domain::frame_source::FrameSource;
use crate::capture::error::CaptureError;
use crate::shared::frame::Frame;

/// A video file behaving like a playing media element.
///
/// Decoding runs via ffmpeg-next (libavformat + libavcodec); a wall-clock
/// playback position decides which frame a grab returns, skipping decoded
/// frames to catch up. Grabs while paused report `NotReady`; grabs past the
/// last frame report `Ended`.
pub struct VideoSource {
    path: PathBuf,
    ictx: Option<ffmpeg_next::format::context::Input>,
    decoder: Option<ffmpeg_next::decoder::Video>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    video_stream_index: usize,
    width: u32,
    height: u32,
    fps: f64,
    total_frames: usize,
    frames_decoded: usize,
    last_frame: Option<Frame>,
    flushing: bool,
    ended: bool,
    playback: Playback,
}

#[derive(Clone, Copy, Debug)]
enum Playback {
    Paused { position_secs: f64 },
    Playing { started: Instant, base_secs: f64 },
}

// Safety: VideoSource is only used from a single thread at a time (the
// poll worker). The raw pointers inside ffmpeg types are not shared.
unsafe impl Send for VideoSource {}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        ffmpeg_next::init().map_err(decode_err)?;

        let ictx = ffmpeg_next::format::input(path).map_err(decode_err)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::Decode("no video stream found".to_string()))?;
        let video_stream_index = stream.index();

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(decode_err)?;
        let decoder = codec_ctx.decoder().video().map_err(decode_err)?;

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(CaptureError::NotReady);
        }

        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let total_frames = stream.frames().max(0) as usize;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(decode_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            ictx: Some(ictx),
            decoder: Some(decoder),
            scaler: Some(scaler),
            video_stream_index,
            width,
            height,
            fps,
            total_frames,
            frames_decoded: 0,
            last_frame: None,
            flushing: false,
            ended: false,
            playback: Playback::Paused { position_secs: 0.0 },
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.playback, Playback::Playing { .. })
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Current playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        match self.playback {
            Playback::Paused { position_secs } => position_secs,
            Playback::Playing { started, base_secs } => base_secs + started.elapsed().as_secs_f64(),
        }
    }

    pub fn pause(&mut self) {
        if let Playback::Playing { started, base_secs } = self.playback {
            self.playback = Playback::Paused {
                position_secs: base_secs + started.elapsed().as_secs_f64(),
            };
        }
    }

    /// Rewinds to the first frame by reopening the demuxer.
    ///
    /// On reopen failure the source degrades to `NotReady` instead of
    /// erroring; teardown paths must stay infallible.
    pub fn rewind(&mut self) {
        match Self::open(&self.path) {
            Ok(fresh) => *self = fresh,
            Err(e) => {
                log::warn!("failed to rewind {}: {e}", self.path.display());
                self.ictx = None;
                self.decoder = None;
                self.scaler = None;
                self.playback = Playback::Paused { position_secs: 0.0 };
            }
        }
    }

    /// Returns the frame at `target` (0-based), decoding forward as needed.
    fn frame_at(&mut self, target: usize) -> Result<Frame, CaptureError> {
        while self.frames_decoded <= target && !self.ended {
            match self.decode_next()? {
                Some(frame) => {
                    self.last_frame = Some(frame);
                    self.frames_decoded += 1;
                }
                None => self.ended = true,
            }
        }
        if self.ended && self.frames_decoded <= target {
            return Err(CaptureError::Ended);
        }
        self.last_frame.clone().ok_or(CaptureError::NotReady)
    }

    fn decode_next(&mut self) -> Result<Option<Frame>, CaptureError> {
        let (Some(ictx), Some(decoder), Some(scaler)) = (
            self.ictx.as_mut(),
            self.decoder.as_mut(),
            self.scaler.as_mut(),
        ) else {
            return Err(CaptureError::NotReady);
        };

        if let Some(frame) = try_receive(decoder, scaler, self.width, self.height)? {
            return Ok(Some(frame));
        }
        if self.flushing {
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = ictx.packets().next() else {
                let _ = decoder.send_eof();
                self.flushing = true;
                return try_receive(decoder, scaler, self.width, self.height);
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            if decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(frame) = try_receive(decoder, scaler, self.width, self.height)? {
                return Ok(Some(frame));
            }
        }
    }
}

impl FrameSource for VideoSource {
    fn native_size(&self) -> Option<(u32, u32)> {
        if self.ictx.is_none() || self.width == 0 || self.height == 0 {
            None
        } else {
            Some((self.width, self.height))
        }
    }

    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if !self.is_playing() {
            return Err(CaptureError::NotReady);
        }
        if self.ictx.is_none() || self.fps <= 0.0 {
            return Err(CaptureError::NotReady);
        }
        let target = (self.position_secs() * self.fps).floor() as usize;
        self.frame_at(target)
    }

    fn play(&mut self) {
        if let Playback::Paused { position_secs } = self.playback {
            self.playback = Playback::Playing {
                started: Instant::now(),
                base_secs: position_secs,
            };
        }
    }

    fn stop(&mut self) {
        self.pause();
        self.rewind();
    }
}

fn decode_err(e: ffmpeg_next::Error) -> CaptureError {
    CaptureError::Decode(e.to_string())
}

fn try_receive(
    decoder: &mut ffmpeg_next::decoder::Video,
    scaler: &mut ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
) -> Result<Option<Frame>, CaptureError> {
    let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
    if decoder.receive_frame(&mut decoded).is_ok() {
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        let pixels = extract_rgb_pixels(&rgb, width, height);
        Ok(Some(Frame::new(pixels, width, height)))
    } else {
        Ok(None)
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping any per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
