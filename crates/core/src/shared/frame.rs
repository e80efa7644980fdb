use std::time::Duration;

use ndarray::ArrayView3;

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// `index` is the pipeline-wide sequence number assigned by the ingestor and
/// keeps increasing across reconnects. `epoch` counts input connections, so a
/// change of epoch marks a stream discontinuity. `timestamp` is the capture
/// time relative to the start of the pipeline run.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    epoch: u64,
    timestamp: Duration,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            epoch: 0,
            timestamp: Duration::ZERO,
        }
    }

    /// Re-stamps the frame with its pipeline position.
    pub fn stamped(mut self, index: usize, epoch: u64, timestamp: Duration) -> Self {
        self.index = index;
        self.epoch = epoch;
        self.timestamp = timestamp;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Copies a rectangular region into a tightly packed buffer.
    ///
    /// The rectangle must lie inside the frame; callers clamp it first
    /// (see [`crate::shared::bounding_box::BoundingBox::to_crop_rect`]).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        let channels = self.channels as usize;
        let fw = self.width as usize;
        let row_len = width as usize * channels;
        let mut out = Vec::with_capacity(row_len * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = (row * fw + x as usize) * channels;
            out.extend_from_slice(&self.data[start..start + row_len]);
        }
        out
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
