use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A key type that can live in a [`PromiseCache`](super::PromiseCache)
/// next to keys of other types.
pub trait AnyKey: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn AnyKey) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> AnyKey for T
where
    T: Any + Eq + Hash + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn AnyKey) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state)
    }
}

/// Identifies one memoized promise: a loader's type tag plus its key.
///
/// The tag keeps loaders that share a cache apart, so key `1` of one loader
/// never collides with key `1` of another.
#[derive(Clone)]
pub struct CacheKey {
    type_tag: Arc<str>,
    key: Arc<dyn AnyKey>,
}

impl CacheKey {
    /// # Panics
    ///
    /// Panics if `type_tag` is empty.
    pub fn new<K: AnyKey>(type_tag: impl Into<Arc<str>>, key: K) -> Self {
        let type_tag = type_tag.into();
        assert!(!type_tag.is_empty(), "cache key type tag must not be empty");
        CacheKey {
            type_tag,
            key: Arc::new(key),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The key, if it is a `K`.
    pub fn key<K: Any>(&self) -> Option<&K> {
        self.key.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_tag == other.type_tag && self.key.dyn_eq(&*other.key)
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_tag.hash(state);
        self.key.dyn_hash(state);
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.type_tag, self.key)
    }
}
