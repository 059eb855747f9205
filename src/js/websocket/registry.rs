//! Handle registry
//!
//! Maps small nonzero integers to live socket entries. Handles are issued
//! from a monotonic counter starting at 1 and are never reused.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

/// A live socket handle as seen by the module. 0 is never a valid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(NonZeroU32);

impl SocketHandle {
    /// Returns `None` for 0, the creation-failure sentinel.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl From<SocketHandle> for u32 {
    fn from(handle: SocketHandle) -> Self {
        handle.get()
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct HandleRegistry<T> {
    entries: HashMap<SocketHandle, T>,
    // 0 once the counter has wrapped: the handle space is exhausted.
    next: u32,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next: 1,
        }
    }

    /// The handle the next `install` must use, if any remain.
    pub fn next_handle(&self) -> Option<SocketHandle> {
        SocketHandle::new(self.next)
    }

    /// Record `value` under the handle returned by `next_handle` and
    /// advance the counter.
    pub fn install(&mut self, handle: SocketHandle, value: T) {
        debug_assert_eq!(Some(handle), self.next_handle());
        self.entries.insert(handle, value);
        self.next = handle.get().wrapping_add(1);
    }

    pub fn get(&self, handle: SocketHandle) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn remove(&mut self, handle: SocketHandle) -> Option<T> {
        self.entries.remove(&handle)
    }

    pub fn contains(&self, handle: SocketHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, leaving the counter where it is.
    pub fn drain(&mut self) -> impl Iterator<Item = (SocketHandle, T)> + '_ {
        self.entries.drain()
    }

    #[cfg(test)]
    pub(crate) fn with_next(next: u32) -> Self {
        Self {
            entries: HashMap::new(),
            next,
        }
    }
}
