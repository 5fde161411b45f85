use crossbeam_queue::ArrayQueue;

/// Objects that can be cleared and handed out again by an [`ObjectPool`].
pub trait Reset {
    fn reset(&mut self);
}

/// Default number of pooled objects per available CPU.
pub const OBJECTS_PER_CPU: usize = 4;

/// A bounded, lock-free free list of reusable objects.
///
/// `get` pops a previously returned object or builds a new one; `put` resets
/// the object and keeps it if there is room, dropping it otherwise.
pub struct ObjectPool<T> {
    queue: ArrayQueue<T>,
}

impl<T: Reset> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new(num_cpus::get() * OBJECTS_PER_CPU)
    }
}

impl<T: Default + Reset> ObjectPool<T> {
    pub fn get(&self) -> T {
        self.get_with(T::default)
    }
}

impl<T: Reset> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        ObjectPool {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Pops a pooled object, or builds one with `create` if the pool is empty.
    pub fn get_with(&self, create: impl FnOnce() -> T) -> T {
        self.queue.pop().unwrap_or_else(create)
    }

    pub fn put(&self, mut object: T) {
        object.reset();
        // Full pool: the object is simply dropped.
        let _ = self.queue.push(object);
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Objects currently waiting to be reused.
    pub fn available(&self) -> usize {
        self.queue.len()
    }
}
