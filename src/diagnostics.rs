use std::fmt::Debug;

use tracing::{debug, trace, warn};

use crate::cache::CacheKey;

/// Observer for what a loader does with its batches and cache.
///
/// Every method has an empty default, so implementors only override the
/// events they care about. Keys are passed as `Debug` trait objects so one
/// observer can serve loaders of any key type.
pub trait DiagnosticEvents: Send + Sync {
    /// A load was answered by a promise that was already cached.
    fn resolved_from_cache(&self, _key: &CacheKey) {}

    /// A batch is about to be handed to the batch function.
    fn batch_started(&self, _type_tag: &str, _keys: &[&dyn Debug]) {}

    /// The batch function failed the whole batch; every key was rejected.
    fn batch_error(&self, _type_tag: &str, _keys: &[&dyn Debug], _error: &dyn Debug) {}

    /// The batch function returned an error for one key.
    fn item_error(&self, _type_tag: &str, _key: &dyn Debug, _error: &dyn Debug) {}

    /// All promises of the batch are completed. `failed` counts the keys
    /// that were rejected.
    fn batch_finished(&self, _type_tag: &str, _keys: &[&dyn Debug], _failed: usize) {}
}

/// Reports diagnostic events as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticEvents for TracingDiagnostics {
    fn resolved_from_cache(&self, key: &CacheKey) {
        trace!(?key, "resolved from cache");
    }

    fn batch_started(&self, type_tag: &str, keys: &[&dyn Debug]) {
        debug!(type_tag, keys = keys.len(), "batch started");
    }

    fn batch_error(&self, type_tag: &str, keys: &[&dyn Debug], error: &dyn Debug) {
        warn!(type_tag, keys = keys.len(), ?error, "batch failed");
    }

    fn item_error(&self, type_tag: &str, key: &dyn Debug, error: &dyn Debug) {
        debug!(type_tag, ?key, ?error, "batch item failed");
    }

    fn batch_finished(&self, type_tag: &str, keys: &[&dyn Debug], failed: usize) {
        debug!(type_tag, keys = keys.len(), failed, "batch finished");
    }
}
