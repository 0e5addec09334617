//! The shared handle cache of a resolution session.
//!
//! A [`ResolverContext`] owns every [`FileIO`] and [`FileSystem`] opened through a
//! [`crate::Resolver`]. Handles are keyed by the identity of the path specification that opened
//! them ([`CacheKey`]) and reference counted: each successful [`ResolverContext::acquire`] hands
//! out a [`Lease`], and the handle is closed when the last lease on it is released.
//!
//! # Concurrency
//!
//! Each key owns a slot with its own mutex. The map shard lock is only held while fetching or
//! inserting a slot; the handle factory runs under the slot mutex. As a result two threads
//! opening the same key construct the handle exactly once, while threads opening different keys
//! never wait on each other. Factories of nested containers acquire the slots of their parents,
//! so slots are always locked from the innermost layer outward.
//!
//! Closing a handle happens after its slot has been unlocked and removed. A handle that holds
//! leases on its parents releases them when it is dropped, which cascades outward without any
//! lock being held.

use std::{
    fmt,
    ops::Deref,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;
use strum::Display;
use tracing::{debug, trace, warn};

use crate::{file_io::FileIO, path::PathSpec, vfs::FileSystem, Error, Result};

/// The kind of handle stored under a [`CacheKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HandleKind {
    /// A byte stream ([`FileIO`])
    FileObject,
    /// A parsed container ([`FileSystem`])
    FileSystem,
}

/// Identity of a cached handle.
///
/// Keys compare path specifications structurally, node by node. The resolver builds them from
/// canonical path specifications, so different spellings of one entry share a key. File system
/// keys ignore the entry-addressing parts of the innermost node, so all entries of one container
/// share a single parsed file system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: HandleKind,
    path_spec: PathSpec,
}

impl CacheKey {
    /// Key of the byte stream addressed by `path_spec`.
    #[must_use]
    pub fn file_object(path_spec: &PathSpec) -> CacheKey {
        CacheKey {
            kind: HandleKind::FileObject,
            path_spec: path_spec.clone(),
        }
    }

    /// Key of the file system containing the entry addressed by `path_spec`.
    #[must_use]
    pub fn file_system(path_spec: &PathSpec) -> CacheKey {
        CacheKey {
            kind: HandleKind::FileSystem,
            path_spec: path_spec.file_system_identity(),
        }
    }

    /// The kind of handle this key refers to.
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// The path specification identifying the handle.
    #[must_use]
    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let comparable = self.path_spec.comparable();
        write!(f, "{}[", self.kind)?;
        for (index, line) in comparable.lines().enumerate() {
            if index > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(line)?;
        }
        f.write_str("]")
    }
}

/// A handle stored in the cache.
#[derive(Debug, Clone)]
pub enum CachedHandle {
    /// A byte stream
    FileObject(Arc<dyn FileIO>),
    /// A parsed container
    FileSystem(Arc<dyn FileSystem>),
}

impl CachedHandle {
    fn close(&self) -> Result<()> {
        match self {
            CachedHandle::FileObject(handle) => handle.close(),
            CachedHandle::FileSystem(handle) => handle.close(),
        }
    }
}

/// Handle types the [`ResolverContext`] can cache.
pub trait CacheHandle: Send + Sync {
    /// Wraps a handle for storage.
    fn into_cached(handle: Arc<Self>) -> CachedHandle;

    /// Unwraps a stored handle, `None` if it holds a different kind.
    fn from_cached(cached: &CachedHandle) -> Option<Arc<Self>>;
}

impl CacheHandle for dyn FileIO {
    fn into_cached(handle: Arc<Self>) -> CachedHandle {
        CachedHandle::FileObject(handle)
    }

    fn from_cached(cached: &CachedHandle) -> Option<Arc<Self>> {
        match cached {
            CachedHandle::FileObject(handle) => Some(handle.clone()),
            CachedHandle::FileSystem(_) => None,
        }
    }
}

impl CacheHandle for dyn FileSystem {
    fn into_cached(handle: Arc<Self>) -> CachedHandle {
        CachedHandle::FileSystem(handle)
    }

    fn from_cached(cached: &CachedHandle) -> Option<Arc<Self>> {
        match cached {
            CachedHandle::FileSystem(handle) => Some(handle.clone()),
            CachedHandle::FileObject(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    value: Option<CachedHandle>,
    references: usize,
    /// Set once the slot has left the map; a retired slot is never reused.
    retired: bool,
}

/// Per-key cache entry.
#[derive(Debug, Default)]
struct CacheSlot {
    state: Mutex<SlotState>,
}

/// Reference-counted cache of open handles, shared by every resolution of one session.
///
/// The context is created by the caller before resolution starts, passed to the resolver as an
/// `Arc<ResolverContext>`, and torn down with [`ResolverContext::empty`] at the end of the
/// session.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use vfscope::{CacheKey, FileIO, Lease, Memory, PathSpec, ResolverContext};
///
/// let context = Arc::new(ResolverContext::new());
/// let key = CacheKey::file_object(&PathSpec::fake("/evidence.bin"));
///
/// let first: Lease<dyn FileIO> = context.acquire(key.clone(), || {
///     Ok(Arc::new(Memory::new(b"evidence".to_vec())) as Arc<dyn FileIO>)
/// })?;
/// let second: Lease<dyn FileIO> = context.acquire(key.clone(), || {
///     Err(vfscope::Error::Error("already cached, never called".into()))
/// })?;
///
/// assert!(Arc::ptr_eq(first.handle(), second.handle()));
/// assert_eq!(context.reference_count(&key), Some(2));
///
/// first.release()?;
/// second.release()?;
/// assert!(!context.contains(&key));
/// # Ok::<(), vfscope::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ResolverContext {
    slots: DashMap<CacheKey, Arc<CacheSlot>>,
}

impl ResolverContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> ResolverContext {
        ResolverContext::default()
    }

    /// Returns the cached handle for `key`, constructing it with `factory` on a miss.
    ///
    /// The reference count of the handle is incremented on a hit and set to one on a miss. If
    /// the factory fails, nothing is cached and the error is returned unchanged.
    ///
    /// # Errors
    /// Returns the factory's error, or [`crate::Error::LockError`] if a slot was poisoned by a
    /// panicking factory.
    pub fn acquire<T, F>(self: &Arc<Self>, key: CacheKey, factory: F) -> Result<Lease<T>>
    where
        T: CacheHandle + ?Sized,
        F: FnOnce() -> Result<Arc<T>>,
    {
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CacheSlot::default()))
            .clone();

        let mut state = lock!(slot.state);
        if state.retired {
            // Lost a race against the final release of this key; start over on a fresh slot.
            drop(state);
            self.forget(&key, &slot);
            return self.acquire(key, factory);
        }

        if let Some(cached) = state.value.as_ref() {
            let Some(handle) = T::from_cached(cached) else {
                return Err(Error::Error(format!("cached handle kind mismatch for {key}")));
            };
            state.references += 1;
            trace!(%key, references = state.references, "cache hit");
            drop(state);
            return Ok(Lease::new(handle, key, slot, self.clone()));
        }

        debug!(%key, "cache miss");
        match factory() {
            Ok(handle) => {
                state.value = Some(T::into_cached(handle.clone()));
                state.references = 1;
                drop(state);
                Ok(Lease::new(handle, key, slot, self.clone()))
            }
            Err(error) => {
                state.retired = true;
                drop(state);
                self.forget(&key, &slot);
                debug!(%key, %error, "handle construction failed");
                Err(error)
            }
        }
    }

    /// Releases one reference on `key`, closing the handle when the count reaches zero.
    ///
    /// Pairs with a [`Lease::detach`]; leases release themselves.
    ///
    /// # Errors
    /// Returns [`crate::Error::CacheKeyNotFound`] if there is no live handle for `key`, or the
    /// error raised while closing the handle.
    pub fn release(&self, key: &CacheKey) -> Result<()> {
        let Some(slot) = self.slots.get(key).map(|slot| slot.value().clone()) else {
            return Err(Error::CacheKeyNotFound(key.to_string()));
        };

        let state = lock!(slot.state);
        if state.retired || state.value.is_none() {
            return Err(Error::CacheKeyNotFound(key.to_string()));
        }
        self.decrement(key, &slot, state)
    }

    fn release_lease(&self, key: &CacheKey, slot: &Arc<CacheSlot>) -> Result<()> {
        let state = lock!(slot.state);
        if state.retired {
            trace!(%key, "release after teardown ignored");
            return Ok(());
        }
        self.decrement(key, slot, state)
    }

    fn decrement(
        &self,
        key: &CacheKey,
        slot: &Arc<CacheSlot>,
        mut state: std::sync::MutexGuard<'_, SlotState>,
    ) -> Result<()> {
        state.references = state.references.saturating_sub(1);
        if state.references > 0 {
            trace!(%key, references = state.references, "released reference");
            return Ok(());
        }

        let value = state.value.take();
        state.retired = true;
        drop(state);
        self.forget(key, slot);

        match value {
            Some(handle) => {
                debug!(%key, "closing handle");
                handle.close()
            }
            None => Ok(()),
        }
    }

    fn forget(&self, key: &CacheKey, slot: &Arc<CacheSlot>) {
        self.slots
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    /// Force-closes every cached handle regardless of its reference count.
    ///
    /// Outstanding leases stay valid as references but become inert: releasing them is a
    /// no-op. Calling `empty` on an empty context does nothing.
    ///
    /// # Errors
    /// Returns the first error raised while closing a handle; the remaining handles are closed
    /// regardless.
    pub fn empty(&self) -> Result<()> {
        let keys: Vec<CacheKey> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        if !keys.is_empty() {
            debug!(handles = keys.len(), "tearing down resolver context");
        }

        let mut first_error = None;
        for key in keys {
            let Some((key, slot)) = self.slots.remove(&key) else {
                continue;
            };

            let value = {
                let mut state = lock!(slot.state);
                state.retired = true;
                state.references = 0;
                state.value.take()
            };

            if let Some(handle) = value {
                if let Err(error) = handle.close() {
                    warn!(%key, %error, "failed to close handle during teardown");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no handle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` if a live handle is cached under `key`.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.reference_count(key).is_some()
    }

    /// The current reference count of `key`, `None` if no live handle is cached.
    #[must_use]
    pub fn reference_count(&self, key: &CacheKey) -> Option<usize> {
        let slot = self.slots.get(key).map(|slot| slot.value().clone())?;
        let state = slot.state.lock().ok()?;
        state.value.as_ref().map(|_| state.references)
    }
}

/// A counted reference to a cached handle.
///
/// Every successful [`ResolverContext::acquire`] returns exactly one lease. Releasing the lease,
/// explicitly with [`Lease::release`] or implicitly on drop, returns the reference to the
/// context. A lease dereferences to the handle it holds.
pub struct Lease<T: ?Sized> {
    handle: Arc<T>,
    key: CacheKey,
    slot: Arc<CacheSlot>,
    context: Arc<ResolverContext>,
    released: bool,
}

impl<T: ?Sized> Lease<T> {
    fn new(
        handle: Arc<T>,
        key: CacheKey,
        slot: Arc<CacheSlot>,
        context: Arc<ResolverContext>,
    ) -> Lease<T> {
        Lease {
            handle,
            key,
            slot,
            context,
            released: false,
        }
    }

    /// The shared handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<T> {
        &self.handle
    }

    /// The cache key this lease counts against.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The context the handle is cached in.
    #[must_use]
    pub fn context(&self) -> &Arc<ResolverContext> {
        &self.context
    }

    /// Returns the reference to the context.
    ///
    /// # Errors
    /// Returns the error raised while closing the handle if this was the last reference.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.context.release_lease(&self.key, &self.slot)
    }

    /// Gives up automatic release; the caller must call [`ResolverContext::release`] with the
    /// returned key exactly once.
    #[must_use]
    pub fn detach(mut self) -> (Arc<T>, CacheKey) {
        self.released = true;
        (self.handle.clone(), self.key.clone())
    }
}

impl<T: ?Sized> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T: ?Sized> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key.to_string())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Drop for Lease<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.context.release_lease(&self.key, &self.slot) {
            warn!(key = %self.key, %error, "failed to release dropped lease");
        }
    }
}

/// A lease owned by a long-lived handle, released when that handle is closed.
///
/// File systems hold their parent stream this way, and entry streams hold their file system.
#[derive(Debug)]
pub(crate) struct HeldLease<T: ?Sized>(Mutex<Option<Lease<T>>>);

impl<T: ?Sized> HeldLease<T> {
    pub(crate) fn new(lease: Lease<T>) -> HeldLease<T> {
        HeldLease(Mutex::new(Some(lease)))
    }

    /// The held handle, `None` once released.
    pub(crate) fn handle(&self) -> Option<Arc<T>> {
        let lease = self.0.lock().ok()?;
        lease.as_ref().map(|lease| lease.handle().clone())
    }

    pub(crate) fn release(&self) -> Result<()> {
        let lease = lock!(self.0).take();
        match lease {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{file_io::Memory, test::CountingFile};

    fn key(location: &str) -> CacheKey {
        CacheKey::file_object(&PathSpec::fake(location))
    }

    fn memory(data: &[u8]) -> Result<Arc<dyn FileIO>> {
        Ok(Arc::new(Memory::new(data.to_vec())))
    }

    #[test]
    fn cache_law() {
        let context = Arc::new(ResolverContext::new());
        let constructed = AtomicUsize::new(0);
        let factory = || {
            constructed.fetch_add(1, Ordering::SeqCst);
            memory(b"abc")
        };

        let first: Lease<dyn FileIO> = context.acquire(key("/a"), factory).unwrap();
        let second: Lease<dyn FileIO> = context.acquire(key("/a"), factory).unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(first.handle(), second.handle()));
        assert_eq!(context.reference_count(&key("/a")), Some(2));

        first.release().unwrap();
        assert_eq!(context.reference_count(&key("/a")), Some(1));
        assert_eq!(second.read_vec(0, 3).unwrap(), b"abc");

        second.release().unwrap();
        assert!(!context.contains(&key("/a")));
        assert!(context.is_empty());
    }

    #[test]
    fn close_on_last_release() {
        let context = Arc::new(ResolverContext::new());
        let file = Arc::new(CountingFile::new(b"xyz".to_vec()));

        let lease: Lease<dyn FileIO> = context
            .acquire(key("/x"), || Ok(file.clone() as Arc<dyn FileIO>))
            .unwrap();
        let other: Lease<dyn FileIO> = context
            .acquire(key("/x"), || Ok(file.clone() as Arc<dyn FileIO>))
            .unwrap();

        drop(lease);
        assert_eq!(file.closes.load(Ordering::SeqCst), 0);
        drop(other);
        assert_eq!(file.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_factory_leaves_nothing() {
        let context = Arc::new(ResolverContext::new());
        let result: Result<Lease<dyn FileIO>> =
            context.acquire(key("/broken"), || Err(Error::OutOfBounds));

        assert!(matches!(result, Err(Error::OutOfBounds)));
        assert!(context.is_empty());

        let lease: Lease<dyn FileIO> = context.acquire(key("/broken"), || memory(b"ok")).unwrap();
        assert_eq!(context.reference_count(lease.key()), Some(1));
    }

    #[test]
    fn release_unknown_key() {
        let context = Arc::new(ResolverContext::new());
        assert!(matches!(
            context.release(&key("/never")),
            Err(Error::CacheKeyNotFound(_))
        ));
    }

    #[test]
    fn detach_pairs_with_manual_release() {
        let context = Arc::new(ResolverContext::new());
        let lease: Lease<dyn FileIO> = context.acquire(key("/d"), || memory(b"d")).unwrap();

        let (handle, detached_key) = lease.detach();
        assert_eq!(handle.size().unwrap(), 1);
        assert_eq!(context.reference_count(&detached_key), Some(1));

        context.release(&detached_key).unwrap();
        assert!(matches!(
            context.release(&detached_key),
            Err(Error::CacheKeyNotFound(_))
        ));
    }

    #[test]
    fn empty_closes_everything_and_is_idempotent() {
        let context = Arc::new(ResolverContext::new());
        let file = Arc::new(CountingFile::new(b"1234".to_vec()));

        let lease: Lease<dyn FileIO> = context
            .acquire(key("/e"), || Ok(file.clone() as Arc<dyn FileIO>))
            .unwrap();
        let _second: Lease<dyn FileIO> = context
            .acquire(key("/e"), || Ok(file.clone() as Arc<dyn FileIO>))
            .unwrap();
        let _other: Lease<dyn FileIO> = context.acquire(key("/f"), || memory(b"f")).unwrap();
        assert_eq!(context.len(), 2);

        context.empty().unwrap();
        assert!(context.is_empty());
        assert_eq!(file.closes.load(Ordering::SeqCst), 1);

        // Inert after teardown.
        lease.release().unwrap();
        context.empty().unwrap();
        assert_eq!(file.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kinds_do_not_collide() {
        let spec = PathSpec::fake("/same");
        assert_ne!(CacheKey::file_object(&spec), CacheKey::file_system(&spec));
        assert_eq!(
            CacheKey::file_system(&PathSpec::fake("/a")),
            CacheKey::file_system(&PathSpec::fake("/b"))
        );
        assert_eq!(
            CacheKey::file_object(&spec).to_string(),
            "file_object[type: FAKE, location: /same]"
        );
    }

    #[test]
    fn keys_compare_structurally() {
        let chain = PathSpec::cpio("/b", PathSpec::fake("/a"));
        let single = PathSpec::fake("/a\ntype: CPIO, location: /b");
        assert_ne!(CacheKey::file_object(&chain), CacheKey::file_object(&single));
        assert_ne!(
            CacheKey::file_object(&chain).to_string(),
            CacheKey::file_object(&single).to_string()
        );
        assert_eq!(CacheKey::file_object(&chain).path_spec(), &chain);
    }

    #[test]
    fn held_lease_releases_once() {
        let context = Arc::new(ResolverContext::new());
        let lease: Lease<dyn FileIO> = context.acquire(key("/h"), || memory(b"h")).unwrap();
        let held = HeldLease::new(lease);

        assert!(held.handle().is_some());
        held.release().unwrap();
        assert!(held.handle().is_none());
        assert!(context.is_empty());
        held.release().unwrap();
    }
}
