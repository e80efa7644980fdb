use std::path::Path;
use std::sync::Mutex;

use crate::recognition::domain::descriptor::Descriptor;
use crate::recognition::domain::embedding_extractor::EmbeddingExtractor;
use crate::recognition::domain::face_crop::FaceCrop;
use crate::shared::onnx_session::load_session;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// ArcFace embedding extractor using ONNX Runtime.
///
/// Crops are resized to 112x112, normalised to [-1, 1] and fed through the
/// network; the output is L2-normalised so Euclidean distances between
/// descriptors fall in [0, 2].
pub struct OnnxEmbeddingExtractor {
    session: Mutex<ort::session::Session>,
    descriptor_len: usize,
    min_crop_size: u32,
}

impl OnnxEmbeddingExtractor {
    pub fn new(
        model_path: &Path,
        descriptor_len: usize,
        min_crop_size: u32,
        intra_threads: Option<usize>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path, intra_threads)?;
        Ok(Self {
            session: Mutex::new(session),
            descriptor_len,
            min_crop_size,
        })
    }
}

impl EmbeddingExtractor for OnnxEmbeddingExtractor {
    fn extract(&self, crop: &FaceCrop) -> Result<Option<Descriptor>, Box<dyn std::error::Error>> {
        if crop.width < self.min_crop_size
            || crop.height < self.min_crop_size
            || crop.data.len() < (crop.width * crop.height * 3) as usize
        {
            return Ok(None);
        }

        let tensor = preprocess(&crop.data, crop.width, crop.height);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        let mut embedding = embedding_slice.to_vec();
        l2_normalize(&mut embedding);
        Ok(Some(Descriptor::new(embedding, self.descriptor_len)?))
    }
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
