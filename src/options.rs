use std::fmt;
use std::sync::Arc;

use crate::cache::{DEFAULT_CACHE_SIZE, DEFAULT_TOUCH_THRESHOLD};
use crate::diagnostics::DiagnosticEvents;

/// How a [`Loader`](crate::Loader) batches and caches.
#[derive(Clone)]
pub struct LoaderOptions {
    /// Most distinct keys per batch; `0` means unbounded.
    pub max_batch_size: usize,
    /// Memoize promises in a cache. Without it every load goes to a batch.
    pub caching: bool,
    /// Entries in the loader's own cache; raised to the cache minimum.
    /// Ignored when the loader is given a shared cache.
    pub cache_size: usize,
    /// Share of the cache capacity above which hits refresh recency.
    pub touch_threshold: f32,
    /// Tag separating this loader's keys from other loaders sharing a cache.
    /// Defaults to the batch function's type name.
    pub type_tag: Option<String>,
    pub diagnostics: Option<Arc<dyn DiagnosticEvents>>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            max_batch_size: 0,
            caching: true,
            cache_size: DEFAULT_CACHE_SIZE,
            touch_threshold: DEFAULT_TOUCH_THRESHOLD,
            type_tag: None,
            diagnostics: None,
        }
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("max_batch_size", &self.max_batch_size)
            .field("caching", &self.caching)
            .field("cache_size", &self.cache_size)
            .field("touch_threshold", &self.touch_threshold)
            .field("type_tag", &self.type_tag)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}
