use crate::recognition::domain::descriptor::Descriptor;
use crate::recognition::domain::face_crop::FaceCrop;

/// Turns a face crop into a descriptor.
///
/// `Ok(None)` means the crop holds no usable face. Shared across
/// recognition workers, hence `&self` and `Sync`.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, crop: &FaceCrop) -> Result<Option<Descriptor>, Box<dyn std::error::Error>>;
}
