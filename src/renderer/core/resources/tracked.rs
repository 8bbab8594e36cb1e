//! Identity for GPU objects that other passes bind.
//!
//! wgpu handles carry no comparable identity, so attachments shared across
//! passes are wrapped in [`Tracked`]. Consumers key their bind groups by the
//! [`ResourceId`]s they were built from through [`CachedBindGroup`]; an
//! attachment recreated by a resize gets a fresh id and the stale group is
//! rebuilt on first use instead of being invalidated by hand.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a tracked resource. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Placeholder that no tracked resource ever carries.
    pub const NONE: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A GPU object paired with its [`ResourceId`].
#[derive(Debug)]
pub struct Tracked<T> {
    resource: T,
    id: ResourceId,
}

impl<T> Tracked<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            id: ResourceId::next(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

/// A bind group remembered together with the resource ids it was built from.
#[derive(Debug, Default)]
pub struct CachedBindGroup {
    key: SmallVec<[ResourceId; 4]>,
    group: Option<wgpu::BindGroup>,
}

impl CachedBindGroup {
    /// Returns the cached group when `key` matches, otherwise builds a new one.
    pub fn get_or_build(&mut self, key: &[ResourceId], build: impl FnOnce() -> wgpu::BindGroup) -> &wgpu::BindGroup {
        if !self.is_current(key) {
            self.key.clear();
            self.key.extend_from_slice(key);
            self.group = None;
        }
        self.group.get_or_insert_with(build)
    }

    /// Whether a group built from exactly `key` is cached.
    #[must_use]
    pub fn is_current(&self, key: &[ResourceId]) -> bool {
        self.group.is_some() && self.key.as_slice() == key
    }

    pub fn clear(&mut self) {
        self.key.clear();
        self.group = None;
    }
}
