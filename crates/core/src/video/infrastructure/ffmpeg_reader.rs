use std::time::Duration;

use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;
use crate::video::domain::stream_reader::StreamReader;

/// Socket timeout for network sources, in microseconds.
const NETWORK_TIMEOUT_US: &str = "5000000";

/// Consecutive `EAGAIN` reads tolerated before the session is failed.
const MAX_READ_STALLS: usize = 500;
const READ_STALL_DELAY: Duration = Duration::from_millis(10);

/// Decodes a camera stream via ffmpeg-next (libavformat + libavcodec).
///
/// RTSP sources are pulled over TCP. Each decoded picture is converted to
/// RGB24 and wrapped in a [`Frame`] stamped with its presentation time.
pub struct FfmpegReader {
    input_ctx: Option<ffmpeg_next::format::context::Input>,
    video_stream_index: usize,
}

// Safety: FfmpegReader is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new() -> Self {
        Self {
            input_ctx: None,
            video_stream_index: 0,
        }
    }
}

impl Default for FfmpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamReader for FfmpegReader {
    fn open(&mut self, url: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let ictx =
            ffmpeg_next::format::input_with_dictionary(strip_file_scheme(url), input_options(url))?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let metadata = StreamMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps: rational_to_f64(stream.avg_frame_rate())
                .or_else(|| rational_to_f64(stream.rate()))
                .unwrap_or(0.0),
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_url: url.to_string(),
        };

        log::debug!(
            "Opened {url}: {}x{} @ {:.2} fps ({})",
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.codec
        );

        self.video_stream_index = video_stream_index;
        self.input_ctx = Some(ictx);

        Ok(metadata)
    }

    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
        let Some(ictx) = self.input_ctx.as_mut() else {
            return Box::new(std::iter::once(Err("FfmpegReader: not opened".into())));
        };

        match FfmpegFrameIter::new(ictx, self.video_stream_index) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn close(&mut self) {
        self.input_ctx = None;
    }
}

/// Lazy iterator that decodes one frame per call so a live stream is never
/// buffered beyond what the decoder itself holds.
struct FfmpegFrameIter<'a> {
    ictx: &'a mut ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    time_base: ffmpeg_next::Rational,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    stalls: usize,
    flushing: bool,
    done: bool,
}

impl<'a> FfmpegFrameIter<'a> {
    fn new(
        ictx: &'a mut ffmpeg_next::format::context::Input,
        video_stream_index: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = ictx
            .stream(video_stream_index)
            .ok_or("FfmpegReader: video stream disappeared")?;
        let time_base = stream.time_base();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            time_base,
            width,
            height,
            video_stream_index,
            frame_index: 0,
            stalls: 0,
            flushing: false,
            done: false,
        })
    }

    fn try_receive(&mut self) -> Option<Result<Frame, Box<dyn std::error::Error>>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return None;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            return Some(Err(Box::new(e)));
        }

        let timestamp = decoded
            .timestamp()
            .or_else(|| decoded.pts())
            .map(|pts| pts_to_duration(pts, self.time_base))
            .unwrap_or_default();

        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        let index = self.frame_index;
        let frame =
            Frame::new(pixels, self.width, self.height, 3, index).stamped(index, 0, timestamp);
        self.frame_index += 1;
        Some(Ok(frame))
    }
}

impl Iterator for FfmpegFrameIter<'_> {
    type Item = Result<Frame, Box<dyn std::error::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(result) = self.try_receive() {
            return Some(result);
        }

        if self.flushing {
            self.done = true;
            return None;
        }

        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(self.ictx) {
                Ok(()) => self.stalls = 0,
                Err(ffmpeg_next::Error::Eof) => {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    if let Some(result) = self.try_receive() {
                        return Some(result);
                    }
                    self.done = true;
                    return None;
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                    self.stalls += 1;
                    if self.stalls > MAX_READ_STALLS {
                        self.done = true;
                        return Some(Err("input stalled: no data after repeated reads".into()));
                    }
                    std::thread::sleep(READ_STALL_DELAY);
                    continue;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(Box::new(e)));
                }
            }

            if packet.stream() != self.video_stream_index {
                continue;
            }

            // Corrupt packets are common on lossy links; skip rather than abort.
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::trace!("Dropping undecodable packet: {e}");
                continue;
            }

            if let Some(result) = self.try_receive() {
                return Some(result);
            }
        }
    }
}

fn input_options(url: &str) -> ffmpeg_next::Dictionary<'static> {
    let mut opts = ffmpeg_next::Dictionary::new();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
        opts.set("rtsp_transport", "tcp");
        opts.set("timeout", NETWORK_TIMEOUT_US);
    } else if lower.starts_with("rtmp://")
        || lower.starts_with("http://")
        || lower.starts_with("https://")
    {
        opts.set("rw_timeout", NETWORK_TIMEOUT_US);
    }
    opts
}

fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

fn rational_to_f64(rate: ffmpeg_next::Rational) -> Option<f64> {
    if rate.denominator() == 0 || rate.numerator() <= 0 {
        return None;
    }
    Some(rate.numerator() as f64 / rate.denominator() as f64)
}

fn pts_to_duration(pts: i64, time_base: ffmpeg_next::Rational) -> Duration {
    if time_base.denominator() == 0 || pts < 0 {
        return Duration::ZERO;
    }
    let secs = pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer,
/// stripping per-row stride padding.
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    /// Encodes `num_frames` flat grey MPEG4 frames into `path`.
    pub(crate) fn create_test_video(
        path: &Path,
        num_frames: usize,
        width: u32,
        height: u32,
        fps: i32,
    ) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();

        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();

        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));

        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);

        octx.write_header().unwrap();

        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        let drain = |encoder: &mut ffmpeg_next::codec::encoder::video::Encoder,
                         octx: &mut ffmpeg_next::format::context::Output| {
            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(octx).unwrap();
            }
        };

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                data[row * stride..row * stride + width as usize * 3].fill(value);
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));

            encoder.send_frame(&yuv_frame).unwrap();
            drain(&mut encoder, &mut octx);
        }

        encoder.send_eof().unwrap();
        drain(&mut encoder, &mut octx);

        octx.write_trailer().unwrap();
    }

    fn fixture(num_frames: usize) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        create_test_video(&path, num_frames, 160, 120, 25);
        let url = path.to_string_lossy().into_owned();
        (dir, url)
    }

    #[test]
    fn test_open_returns_metadata() {
        let (_dir, url) = fixture(5);

        let mut reader = FfmpegReader::new();
        let meta = reader.open(&url).unwrap();
        assert_eq!(meta.width, 160);
        assert_eq!(meta.height, 120);
        assert!(meta.fps > 0.0);
        assert_eq!(meta.source_url, url);
    }

    #[test]
    fn test_open_accepts_file_scheme() {
        let (_dir, url) = fixture(1);

        let mut reader = FfmpegReader::new();
        assert!(reader.open(&format!("file://{url}")).is_ok());
    }

    #[test]
    fn test_open_unreachable_source_fails() {
        let mut reader = FfmpegReader::new();
        assert!(reader.open("/nonexistent/stream.mp4").is_err());
    }

    #[test]
    fn test_frames_yield_every_picture_in_order() {
        let (_dir, url) = fixture(5);

        let mut reader = FfmpegReader::new();
        reader.open(&url).unwrap();

        let frames: Vec<_> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.channels(), 3);
            assert_eq!(frame.data().len(), 160 * 120 * 3);
        }
    }

    #[test]
    fn test_frame_timestamps_are_non_decreasing() {
        let (_dir, url) = fixture(5);

        let mut reader = FfmpegReader::new();
        reader.open(&url).unwrap();

        let stamps: Vec<_> = reader.frames().map(|f| f.unwrap().timestamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        assert!(stamps[4] > stamps[0]);
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = FfmpegReader::new();
        let result = reader.frames().next().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_close_idempotent() {
        let (_dir, url) = fixture(1);

        let mut reader = FfmpegReader::new();
        reader.open(&url).unwrap();
        reader.close();
        reader.close();
        assert!(reader.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_rtsp_sources_use_tcp() {
        let opts = input_options("RTSP://cam.local:8554/stream");
        assert_eq!(opts.get("rtsp_transport"), Some("tcp"));
        assert!(input_options("/tmp/clip.mp4").get("rtsp_transport").is_none());
    }

    #[test]
    fn test_clean_file_end_yields_no_error_item() {
        let (_dir, url) = fixture(3);

        let mut reader = FfmpegReader::new();
        reader.open(&url).unwrap();
        let items: Vec<_> = reader.frames().collect();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|f| f.is_ok()), "a clean file ends without an error item");
    }

    #[test]
    fn test_pts_to_duration() {
        let tb = ffmpeg_next::Rational(1, 90_000);
        assert_eq!(pts_to_duration(90_000, tb), Duration::from_secs(1));
        assert_eq!(pts_to_duration(-5, tb), Duration::ZERO);
        assert_eq!(pts_to_duration(10, ffmpeg_next::Rational(1, 0)), Duration::ZERO);
    }

    #[test]
    fn test_rational_to_f64_rejects_unknown_rate() {
        assert_eq!(rational_to_f64(ffmpeg_next::Rational(0, 1)), None);
        assert_eq!(rational_to_f64(ffmpeg_next::Rational(30, 0)), None);
        assert_eq!(
            rational_to_f64(ffmpeg_next::Rational(30000, 1001)).map(|f| f.round()),
            Some(30.0)
        );
    }
}
