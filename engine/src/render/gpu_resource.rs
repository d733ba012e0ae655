//! Resizable GPU Resources
//!
//! Holder for GPU resources whose size is derived from a key (tile-grid
//! dimensions, texture extent). Each frame the owner passes the requested key;
//! the resource is rebuilt only when the key differs from the one it was
//! created with. The old resource is always released before the new one is
//! created, never resized in place.
//!
//! `FramePool` covers the other lifetime: resources that live for exactly one
//! frame. A `FrameLease` hands one out and gives it back on drop, on every
//! exit path of the frame.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// A GPU object that can be released explicitly before being dropped.
pub trait Releasable {
    /// Free the underlying GPU memory. The object must not be used afterwards.
    fn release(&mut self);
}

impl Releasable for wgpu::Buffer {
    fn release(&mut self) {
        self.destroy();
    }
}

impl Releasable for wgpu::Texture {
    fn release(&mut self) {
        self.destroy();
    }
}

/// A resource plus the key it was sized for.
pub struct ResizableResource<K, R: Releasable> {
    label: &'static str,
    key: Option<K>,
    resource: Option<R>,
    generation: u32,
}

impl<K: PartialEq + Copy + std::fmt::Debug, R: Releasable> ResizableResource<K, R> {
    /// An empty holder; the first `reallocate_if` always creates.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            key: None,
            resource: None,
            generation: 0,
        }
    }

    /// Recreate the resource when `requested` differs from the current key.
    ///
    /// Returns `true` when a new resource was created.
    pub fn reallocate_if(&mut self, requested: K, create: impl FnOnce(&K) -> R) -> bool {
        self.reallocate_when(requested, |current, requested| current != Some(requested), create)
    }

    /// Recreate the resource when `predicate(current_key, requested)` holds or
    /// when nothing has been created yet.
    pub fn reallocate_when(
        &mut self,
        requested: K,
        predicate: impl FnOnce(Option<&K>, &K) -> bool,
        create: impl FnOnce(&K) -> R,
    ) -> bool {
        if self.resource.is_some() && !predicate(self.key.as_ref(), &requested) {
            return false;
        }

        self.release();
        self.resource = Some(create(&requested));
        self.key = Some(requested);
        self.generation = self.generation.wrapping_add(1);
        log::info!("[{}] allocated for {:?} (generation {})", self.label, requested, self.generation);
        true
    }

    /// Release the current resource, if any. The next `reallocate_if` creates.
    pub fn release(&mut self) {
        if let Some(mut old) = self.resource.take() {
            old.release();
        }
        self.key = None;
    }

    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Number of allocations performed so far.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

type FreeList<K, R> = Arc<Mutex<Vec<(K, R)>>>;

/// Per-frame temporaries keyed by their size, recycled between frames.
pub struct FramePool<K, R: Releasable> {
    label: &'static str,
    free: FreeList<K, R>,
}

impl<K: PartialEq + Copy + std::fmt::Debug, R: Releasable> FramePool<K, R> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            free: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Lease a resource for `key`, reusing a returned one when the key
    /// matches. Returned resources of any other key are released first.
    pub fn acquire(&self, key: K, create: impl FnOnce(&K) -> R) -> FrameLease<K, R> {
        let reused = {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            let mut reused = None;
            for (held_key, mut resource) in free.drain(..) {
                if reused.is_none() && held_key == key {
                    reused = Some(resource);
                } else {
                    resource.release();
                }
            }
            reused
        };

        let resource = match reused {
            Some(resource) => resource,
            None => {
                log::info!("[{}] created temporary for {:?}", self.label, key);
                create(&key)
            }
        };

        FrameLease {
            key,
            resource: Some(resource),
            free: Arc::clone(&self.free),
        }
    }

    /// Resources currently returned and waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Release every idle resource.
    pub fn release_all(&self) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, mut resource) in free.drain(..) {
            resource.release();
        }
    }
}

/// A resource borrowed from a `FramePool` for one frame.
pub struct FrameLease<K: Copy, R: Releasable> {
    key: K,
    resource: Option<R>,
    free: FreeList<K, R>,
}

impl<K: Copy, R: Releasable> FrameLease<K, R> {
    pub fn key(&self) -> K {
        self.key
    }
}

impl<K: Copy + std::fmt::Debug, R: Releasable> std::fmt::Debug for FrameLease<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLease").field("key", &self.key).finish_non_exhaustive()
    }
}

impl<K: Copy, R: Releasable> Deref for FrameLease<K, R> {
    type Target = R;

    fn deref(&self) -> &R {
        // Only `drop` takes the resource out.
        self.resource.as_ref().unwrap_or_else(|| unreachable!("lease used after drop"))
    }
}

impl<K: Copy, R: Releasable> Drop for FrameLease<K, R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.push((self.key, resource));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Tracked {
        id: u32,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Releasable for Tracked {
        fn release(&mut self) {
            self.log.borrow_mut().push(format!("release {}", self.id));
        }
    }

    fn make(log: &Rc<RefCell<Vec<String>>>, id: u32) -> Tracked {
        log.borrow_mut().push(format!("create {id}"));
        Tracked { id, log: Rc::clone(log) }
    }

    #[test]
    fn test_first_call_creates() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut res: ResizableResource<(u32, u32), Tracked> = ResizableResource::new("test");
        assert!(res.get().is_none());
        assert!(res.reallocate_if((4, 4), |_| make(&log, 1)));
        assert_eq!(res.key(), Some(&(4, 4)));
        assert_eq!(res.generation(), 1);
    }

    #[test]
    fn test_same_key_reuses() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut res = ResizableResource::new("test");
        res.reallocate_if((4, 4), |_| make(&log, 1));
        assert!(!res.reallocate_if((4, 4), |_| make(&log, 2)));
        assert_eq!(res.get().map(|t| t.id), Some(1));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_changed_key_releases_before_create() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut res = ResizableResource::new("test");
        res.reallocate_if((4, 4), |_| make(&log, 1));
        assert!(res.reallocate_if((8, 4), |_| make(&log, 2)));
        assert_eq!(*log.borrow(), vec!["create 1", "release 1", "create 2"]);
        assert_eq!(res.generation(), 2);
    }

    #[test]
    fn test_predicate_forces_rebuild() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut res = ResizableResource::new("test");
        res.reallocate_if(1u32, |_| make(&log, 1));
        assert!(res.reallocate_when(1u32, |_, _| true, |_| make(&log, 2)));
        assert_eq!(res.get().map(|t| t.id), Some(2));
    }

    #[test]
    fn test_release_clears_key() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut res = ResizableResource::new("test");
        res.reallocate_if(3u32, |_| make(&log, 1));
        res.release();
        assert!(res.get().is_none());
        assert!(res.key().is_none());
        assert_eq!(log.borrow().last().map(String::as_str), Some("release 1"));
    }

    #[test]
    fn test_lease_returns_on_drop_and_is_reused() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pool: FramePool<(u32, u32), Tracked> = FramePool::new("pool");
        {
            let lease = pool.acquire((8, 8), |_| make(&log, 1));
            assert_eq!(lease.id, 1);
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let lease = pool.acquire((8, 8), |_| make(&log, 2));
        assert_eq!(lease.id, 1);
        assert_eq!(*log.borrow(), vec!["create 1"]);
    }

    #[test]
    fn test_lease_returns_on_early_exit() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pool: FramePool<u32, Tracked> = FramePool::new("pool");
        let frame = |fail: bool| -> Result<(), ()> {
            let _lease = pool.acquire(1, |_| make(&log, 1));
            if fail {
                return Err(());
            }
            Ok(())
        };
        assert!(frame(true).is_err());
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_outstanding_lease_survives_size_change() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pool: FramePool<u32, Tracked> = FramePool::new("pool");
        let first = pool.acquire(1, |_| make(&log, 1));
        let second = pool.acquire(2, |_| make(&log, 2));
        assert_eq!(*log.borrow(), vec!["create 1", "create 2"]);

        // Returned only once its holder is done with it.
        drop(first);
        assert_eq!(pool.idle_count(), 1);
        drop(second);
        drop(pool.acquire(2, |_| make(&log, 3)));
        assert_eq!(log.borrow().last().map(String::as_str), Some("release 1"));
    }

    #[test]
    fn test_size_change_releases_idle_before_create() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pool: FramePool<u32, Tracked> = FramePool::new("pool");
        drop(pool.acquire(1, |_| make(&log, 1)));
        let lease = pool.acquire(2, |_| make(&log, 2));
        assert_eq!(lease.key(), 2);
        assert_eq!(*log.borrow(), vec!["create 1", "release 1", "create 2"]);
        drop(lease);
        pool.release_all();
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(log.borrow().last().map(String::as_str), Some("release 2"));
    }
}
