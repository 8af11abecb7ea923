//! Stem separator adapter with a per-process model cache

use super::traits::{ModelLoader, StemModel};
use crate::audio;
use crate::error::{Result, StemsplitError};
use crate::types::{StemCount, StemSet};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Owns the model cache and turns staged audio into a [`StemSet`]
///
/// Models are loaded lazily, once per stem count, and reused by every
/// request handled by this process. Lookups take a read lock; a miss takes
/// the write lock, checks again and loads while holding it, so concurrent
/// cold starts for the same stem count load the model exactly once.
pub struct SeparationContext {
    loader: Box<dyn ModelLoader>,
    models: RwLock<HashMap<StemCount, Arc<dyn StemModel>>>,
}

impl SeparationContext {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached model for `stems`, loading it on first use
    pub fn model(&self, stems: StemCount) -> Result<Arc<dyn StemModel>> {
        {
            let models = self.models.read().unwrap_or_else(|poisoned| {
                warn!("Model cache lock poisoned by an earlier load, recovering");
                poisoned.into_inner()
            });
            if let Some(model) = models.get(&stems) {
                return Ok(Arc::clone(model));
            }
        }

        // Entries are only inserted after a load returns, so a poisoned map is intact
        let mut models = self
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = models.get(&stems) {
            return Ok(Arc::clone(model));
        }

        info!("Loading {} model...", stems);
        let start = Instant::now();
        let model: Arc<dyn StemModel> = Arc::from(self.loader.load(stems)?);
        info!(
            "Loaded {} ({}) in {:.2}s",
            stems,
            model.name(),
            start.elapsed().as_secs_f64()
        );

        models.insert(stems, Arc::clone(&model));
        Ok(model)
    }

    /// Number of models currently cached
    pub fn loaded_models(&self) -> usize {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Decode a staged input file and separate it into named stems
    pub fn separate(&self, input: &Path, stems: StemCount) -> Result<StemSet> {
        let model = self.model(stems)?;

        let mixture = audio::decode_stereo(input)?;
        info!(
            "Separating {:.2}s of audio into {} with {}",
            mixture.duration,
            stems,
            model.name()
        );

        let start = Instant::now();
        let buffers = model.separate(&mixture)?;
        let produced = buffers.len();

        let stem_set = StemSet::from_model_output(stems, buffers).ok_or_else(|| {
            StemsplitError::separation(format!(
                "Model produced {} stems, expected {}",
                produced,
                stems.count()
            ))
        })?;

        debug!(
            "Separation took {:.2}s: {:?}",
            start.elapsed().as_secs_f64(),
            stem_set.names()
        );

        Ok(stem_set)
    }
}
