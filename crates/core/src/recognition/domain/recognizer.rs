use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::recognition::domain::embedding_cache::EmbeddingCache;
use crate::recognition::domain::embedding_extractor::EmbeddingExtractor;
use crate::recognition::domain::face_crop::FaceCrop;
use crate::recognition::domain::match_service::{MatchOutcome, MatchService};

/// Work item for one recognition attempt.
#[derive(Clone, Debug)]
pub struct RecognitionRequest {
    pub track_id: u32,
    /// Connection epoch of the frame the crop came from.
    pub epoch: u64,
    pub crop: FaceCrop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Recognized(String),
    NoMatch,
    /// Extraction found no usable face in the crop.
    NoFace,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionResult {
    pub track_id: u32,
    pub epoch: u64,
    pub outcome: RecognitionOutcome,
}

/// Extract, consult the cache, then ask the match service.
///
/// The cache lock is never held across the extractor or the network call.
#[derive(Clone)]
pub struct Recognizer {
    extractor: Arc<dyn EmbeddingExtractor>,
    matcher: Arc<dyn MatchService>,
    cache: Arc<Mutex<EmbeddingCache>>,
}

impl Recognizer {
    pub fn new(
        extractor: Arc<dyn EmbeddingExtractor>,
        matcher: Arc<dyn MatchService>,
        cache: Arc<Mutex<EmbeddingCache>>,
    ) -> Self {
        Self {
            extractor,
            matcher,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<Mutex<EmbeddingCache>> {
        &self.cache
    }

    pub fn recognize(&self, request: &RecognitionRequest) -> RecognitionResult {
        RecognitionResult {
            track_id: request.track_id,
            epoch: request.epoch,
            outcome: self.resolve(request),
        }
    }

    fn resolve(&self, request: &RecognitionRequest) -> RecognitionOutcome {
        let descriptor = match self.extractor.extract(&request.crop) {
            Ok(Some(d)) => d,
            Ok(None) => return RecognitionOutcome::NoFace,
            Err(e) => {
                log::warn!("Embedding extraction failed for track {}: {e}", request.track_id);
                return RecognitionOutcome::NoFace;
            }
        };

        if let Some(name) = self.with_cache(|c| c.lookup_similar(&descriptor, Instant::now())) {
            log::debug!("Track {} matched cached descriptor of {name}", request.track_id);
            self.with_cache(|c| c.insert(request.track_id, descriptor, &name, Instant::now()));
            return RecognitionOutcome::Recognized(name);
        }

        match self.matcher.find(&descriptor) {
            MatchOutcome::Matched(name) if !name.trim().is_empty() => {
                self.with_cache(|c| c.insert(request.track_id, descriptor, &name, Instant::now()));
                RecognitionOutcome::Recognized(name)
            }
            _ => RecognitionOutcome::NoMatch,
        }
    }

    /// Runs `f` under the cache lock. A poisoned lock only means another
    /// worker panicked mid-update; the cache holds no cross-entry invariant,
    /// so its contents remain usable.
    fn with_cache<R>(&self, f: impl FnOnce(&mut EmbeddingCache) -> R) -> R {
        let mut guard = match self.cache.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
