//! Revocable references to in-memory bytes.
//!
//! The workflow displays its source and result through lightweight URIs
//! (`blob:` URLs in the browser) that must be released when no longer
//! shown. [`ReferenceStore`] abstracts creation and release so the
//! workflow's lifetime rules can be checked without a browser.
//!
//! Releasing consumes the handle, so one handle cannot be released
//! twice.

use std::collections::BTreeMap;

/// A created reference, displayable through its URI.
pub trait Reference {
    /// The URI to hand to an `<img src>` or download link.
    fn uri(&self) -> &str;
}

/// Creates and releases references to byte content.
pub trait ReferenceStore {
    /// The handle returned by [`create`](Self::create).
    type Handle: Reference;

    /// Create a reference to `bytes` of type `mime_type`.
    fn create(&mut self, bytes: &[u8], mime_type: &str) -> Self::Handle;

    /// Release a reference. The URI stops resolving afterwards.
    fn release(&mut self, handle: Self::Handle);
}

/// Lets a workflow borrow a store owned elsewhere.
impl<S: ReferenceStore + ?Sized> ReferenceStore for &mut S {
    type Handle = S::Handle;

    fn create(&mut self, bytes: &[u8], mime_type: &str) -> Self::Handle {
        (**self).create(bytes, mime_type)
    }

    fn release(&mut self, handle: Self::Handle) {
        (**self).release(handle);
    }
}

/// Handle produced by [`MemoryReferences`].
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryHandle {
    id: u64,
    uri: String,
}

impl MemoryHandle {
    /// Numeric id, unique per store.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Reference for MemoryHandle {
    fn uri(&self) -> &str {
        &self.uri
    }
}

/// An in-memory [`ReferenceStore`] for native use and tests.
///
/// Keeps the referenced bytes until release and counts every create and
/// release so leaks and double releases are observable.
#[derive(Debug, Default)]
pub struct MemoryReferences {
    next_id: u64,
    live: BTreeMap<u64, (String, Vec<u8>)>,
    created: u64,
    released: u64,
    unknown_releases: u64,
}

impl MemoryReferences {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of references created and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Total references ever created.
    #[must_use]
    pub const fn created_count(&self) -> u64 {
        self.created
    }

    /// Total references released.
    #[must_use]
    pub const fn released_count(&self) -> u64 {
        self.released
    }

    /// Releases of handles that were not live (always zero unless a
    /// handle from another store was passed in).
    #[must_use]
    pub const fn unknown_release_count(&self) -> u64 {
        self.unknown_releases
    }

    /// Resolve a URI to its MIME type and bytes, if still live.
    #[must_use]
    pub fn resolve(&self, uri: &str) -> Option<(&str, &[u8])> {
        let id = uri.strip_prefix("mem:")?.parse::<u64>().ok()?;
        self.live
            .get(&id)
            .map(|(mime, bytes)| (mime.as_str(), bytes.as_slice()))
    }
}

impl ReferenceStore for MemoryReferences {
    type Handle = MemoryHandle;

    fn create(&mut self, bytes: &[u8], mime_type: &str) -> MemoryHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.created += 1;
        self.live.insert(id, (mime_type.to_owned(), bytes.to_vec()));
        MemoryHandle {
            id,
            uri: format!("mem:{id}"),
        }
    }

    fn release(&mut self, handle: MemoryHandle) {
        if self.live.remove(&handle.id).is_some() {
            self.released += 1;
        } else {
            self.unknown_releases += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_release_are_counted() {
        let mut store = MemoryReferences::new();
        let a = store.create(b"one", "image/png");
        let b = store.create(b"two", "image/jpeg");
        assert_ne!(a.uri(), b.uri());
        assert_eq!(store.live_count(), 2);

        store.release(a);
        assert_eq!(store.live_count(), 1);
        assert_eq!(store.created_count(), 2);
        assert_eq!(store.released_count(), 1);
        assert_eq!(store.unknown_release_count(), 0);
    }

    #[test]
    fn resolve_returns_live_bytes_only() {
        let mut store = MemoryReferences::new();
        let handle = store.create(b"png-bytes", "image/png");
        let uri = handle.uri().to_owned();
        assert_eq!(store.resolve(&uri), Some(("image/png", &b"png-bytes"[..])));

        store.release(handle);
        assert_eq!(store.resolve(&uri), None);
        assert_eq!(store.resolve("blob:whatever"), None);
    }

    #[test]
    fn foreign_handles_are_flagged() {
        let mut first = MemoryReferences::new();
        let mut second = MemoryReferences::new();
        let _kept = second.create(b"x", "image/png");
        let handle = first.create(b"y", "image/png");
        let id = handle.id();
        first.release(handle);
        second.release(MemoryHandle {
            id: id + 10,
            uri: String::new(),
        });
        assert_eq!(second.unknown_release_count(), 1);
        assert_eq!(second.live_count(), 1);
    }
}
