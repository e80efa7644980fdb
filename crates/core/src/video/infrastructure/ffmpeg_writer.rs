use crate::shared::constants::{DEFAULT_BITRATE_KBPS, DEFAULT_ENCODER_PRESET};
use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;
use crate::video::domain::stream_writer::StreamWriter;

/// Encodes annotated frames to H.264 and publishes them via ffmpeg-next.
///
/// `rtsp://` targets are pushed to an RTSP server over TCP, `rtmp://`
/// targets are muxed as FLV, and anything else is treated as a file whose
/// container is guessed from the extension. Prefers libx264 tuned for low
/// latency, falling back to the built-in MPEG4 encoder when no H.264 encoder
/// is available.
pub struct FfmpegWriter {
    bitrate_kbps: u32,
    preset: String,
    octx: Option<ffmpeg_next::format::context::Output>,
    encoder: Option<ffmpeg_next::codec::encoder::video::Encoder>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    fps: i32,
    frame_count: i64,
}

// Safety: FfmpegWriter is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self {
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            preset: DEFAULT_ENCODER_PRESET.to_string(),
            octx: None,
            encoder: None,
            scaler: None,
            width: 0,
            height: 0,
            fps: 0,
            frame_count: 0,
        }
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = kbps.max(1);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    fn drain_packets(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(encoder), Some(octx)) = (self.encoder.as_mut(), self.octx.as_mut()) else {
            return Ok(());
        };
        let ost_time_base = octx
            .stream(0)
            .ok_or("FfmpegWriter: output stream missing")?
            .time_base();

        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, self.fps), ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

impl Default for FfmpegWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamWriter for FfmpegWriter {
    fn open(
        &mut self,
        url: &str,
        metadata: &StreamMetadata,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        if metadata.width == 0 || metadata.height == 0 {
            return Err(format!(
                "FfmpegWriter: invalid frame size {}x{}",
                metadata.width, metadata.height
            )
            .into());
        }

        let fps = metadata.effective_fps().round().max(1.0) as i32;

        let mut octx = open_output(url)?;

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let (codec, is_h264) = find_encoder().ok_or("No H.264 or MPEG4 encoder available")?;

        let mut ost = octx.add_stream(Some(codec))?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()?;

        encoder_ctx.set_width(metadata.width);
        encoder_ctx.set_height(metadata.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        encoder_ctx.set_bit_rate(self.bitrate_kbps as usize * 1000);
        encoder_ctx.set_gop(fps as u32 * 2);
        encoder_ctx.set_max_b_frames(0);

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg_next::Dictionary::new();
        if is_h264 {
            opts.set("preset", &self.preset);
            opts.set("tune", "zerolatency");
            opts.set("profile", "baseline");
        }

        let encoder = encoder_ctx.open_with(opts)?;
        ost.set_parameters(&encoder);

        octx.write_header()?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            metadata.width,
            metadata.height,
            ffmpeg_next::format::Pixel::YUV420P,
            metadata.width,
            metadata.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!(
            "Publishing {}x{} @ {fps} fps to {url} ({}, {} kbps)",
            metadata.width,
            metadata.height,
            codec.name(),
            self.bitrate_kbps
        );

        self.width = metadata.width;
        self.height = metadata.height;
        self.fps = fps;
        self.octx = Some(octx);
        self.encoder = Some(encoder);
        self.scaler = Some(scaler);
        self.frame_count = 0;

        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let (Some(encoder), Some(scaler)) = (self.encoder.as_mut(), self.scaler.as_mut()) else {
            return Err("FfmpegWriter: not opened".into());
        };

        if frame.width() != self.width || frame.height() != self.height || frame.channels() != 3
        {
            return Err(format!(
                "FfmpegWriter: frame is {}x{}x{}, stream expects {}x{}x3",
                frame.width(),
                frame.height(),
                frame.channels(),
                self.width,
                self.height
            )
            .into());
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.width,
            self.height,
        );

        let stride = rgb_frame.stride(0);
        let row_len = self.width as usize * 3;
        let data = rgb_frame.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_len).enumerate() {
            let dst_start = row * stride;
            data[dst_start..dst_start + row_len].copy_from_slice(src);
        }

        let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&rgb_frame, &mut yuv_frame)?;
        yuv_frame.set_pts(Some(self.frame_count));

        encoder.send_frame(&yuv_frame)?;
        self.drain_packets()?;

        self.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.send_eof()?;
            self.drain_packets()?;
            if let Some(octx) = self.octx.as_mut() {
                octx.write_trailer()?;
            }
        }

        self.octx = None;
        self.encoder = None;
        self.scaler = None;

        Ok(())
    }
}

fn open_output(url: &str) -> Result<ffmpeg_next::format::context::Output, ffmpeg_next::Error> {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
        let mut opts = ffmpeg_next::Dictionary::new();
        opts.set("rtsp_transport", "tcp");
        ffmpeg_next::format::output_as_with(url, "rtsp", opts)
    } else if lower.starts_with("rtmp://") {
        ffmpeg_next::format::output_as(url, "flv")
    } else {
        ffmpeg_next::format::output(url.strip_prefix("file://").unwrap_or(url))
    }
}

fn find_encoder() -> Option<(ffmpeg_next::Codec, bool)> {
    if let Some(codec) = ffmpeg_next::encoder::find_by_name("libx264") {
        return Some((codec, true));
    }
    if let Some(codec) = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::H264) {
        return Some((codec, true));
    }
    ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).map(|c| (c, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::domain::stream_reader::StreamReader;
    use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;

    fn metadata(w: u32, h: u32, fps: f64) -> StreamMetadata {
        StreamMetadata {
            width: w,
            height: h,
            fps,
            codec: String::new(),
            source_url: String::new(),
        }
    }

    fn solid_frame(index: usize, w: u32, h: u32, value: u8) -> Frame {
        let data = vec![value; (w * h * 3) as usize];
        Frame::new(data, w, h, 3, index)
    }

    fn output_url(dir: &tempfile::TempDir) -> String {
        dir.path().join("out.mp4").to_string_lossy().into_owned()
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = output_url(&dir);

        let mut writer = FfmpegWriter::new();
        writer.open(&url, &metadata(160, 120, 30.0)).unwrap();
        for i in 0..3 {
            writer.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        writer.close().unwrap();

        assert!(std::fs::metadata(&url).unwrap().len() > 0);
    }

    #[test]
    fn test_unknown_fps_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let url = output_url(&dir);

        let mut writer = FfmpegWriter::new().with_bitrate(512);
        writer.open(&url, &metadata(160, 120, 0.0)).unwrap();
        assert_eq!(writer.fps, 30);
        writer.write(&solid_frame(0, 160, 120, 10)).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_mismatched_frame_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let url = output_url(&dir);

        let mut writer = FfmpegWriter::new();
        writer.open(&url, &metadata(160, 120, 30.0)).unwrap();
        assert!(writer.write(&solid_frame(0, 80, 60, 128)).is_err());
        writer.close().unwrap();
    }

    #[test]
    fn test_zero_size_stream_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FfmpegWriter::new();
        assert!(writer.open(&output_url(&dir), &metadata(0, 0, 30.0)).is_err());
    }

    #[test]
    fn test_write_without_open_returns_error() {
        let mut writer = FfmpegWriter::new();
        assert!(writer.write(&solid_frame(0, 160, 120, 128)).is_err());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = output_url(&dir);

        let mut writer = FfmpegWriter::new();
        writer.open(&url, &metadata(160, 120, 30.0)).unwrap();
        writer.write(&solid_frame(0, 160, 120, 128)).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_published_frames_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let url = output_url(&dir);

        let mut writer = FfmpegWriter::new();
        writer.open(&url, &metadata(160, 120, 25.0)).unwrap();
        for i in 0..3 {
            writer.write(&solid_frame(i, 160, 120, 128)).unwrap();
        }
        writer.close().unwrap();

        let mut reader = FfmpegReader::new();
        let read_meta = reader.open(&url).unwrap();
        assert_eq!((read_meta.width, read_meta.height), (160, 120));

        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 3);

        let first = &frames[0];
        let avg: f64 =
            first.data().iter().map(|&b| b as f64).sum::<f64>() / first.data().len() as f64;
        assert!(
            (avg - 128.0).abs() < 40.0,
            "Average pixel value {avg} should be close to 128"
        );
    }
}
