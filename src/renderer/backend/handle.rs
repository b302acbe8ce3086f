//! Scoped GPU Handles
//!
//! Every GPU object is represented by a slotmap key owned through an
//! [`Owned`] guard. Dropping the guard queues a [`ReleaseRequest`] on the
//! backend's release channel; the backend destroys the object the next time it
//! drains the channel (at the end of [`CommandStream::frame`], or explicitly via
//! [`CommandStream::collect_released`]).
//!
//! ```text
//! create_*() ──► Owned<K> ──drop──► Releaser ══flume══► backend.collect_released()
//! ```
//!
//! Deferring destruction to the drain point keeps objects alive for commands
//! already recorded in the current frame.
//!
//! [`CommandStream::frame`]: super::CommandStream::frame
//! [`CommandStream::collect_released`]: super::CommandStream::collect_released

use std::fmt;

use slotmap::{Key, new_key_type};

new_key_type! {
    /// A compiled compute or graphics program.
    pub struct ProgramId;
    /// A GPU buffer (storage, vertex or index).
    pub struct BufferId;
    /// An offscreen render target (color + optional depth).
    pub struct FramebufferId;
}

/// Destruction request sent when an [`Owned`] guard is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRequest {
    Program(ProgramId),
    Buffer(BufferId),
    Framebuffer(FramebufferId),
}

/// Keys that can be released through the backend channel.
pub trait GpuKey: Key + fmt::Debug {
    fn release_request(self) -> ReleaseRequest;
}

impl GpuKey for ProgramId {
    fn release_request(self) -> ReleaseRequest {
        ReleaseRequest::Program(self)
    }
}

impl GpuKey for BufferId {
    fn release_request(self) -> ReleaseRequest {
        ReleaseRequest::Buffer(self)
    }
}

impl GpuKey for FramebufferId {
    fn release_request(self) -> ReleaseRequest {
        ReleaseRequest::Framebuffer(self)
    }
}

/// Sending half of a backend's release channel.
#[derive(Clone, Debug)]
pub struct Releaser {
    sender: flume::Sender<ReleaseRequest>,
}

impl Releaser {
    /// Creates a release channel; the backend keeps the receiver.
    #[must_use]
    pub fn channel() -> (Self, flume::Receiver<ReleaseRequest>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Wraps a freshly created key in a guard bound to this channel.
    #[must_use]
    pub fn own<K: GpuKey>(&self, key: K) -> Owned<K> {
        Owned {
            key,
            releaser: Some(self.clone()),
        }
    }

    fn release(&self, request: ReleaseRequest) {
        // The backend may already be gone; its objects died with it.
        let _ = self.sender.send(request);
    }
}

/// Exclusive owner of a GPU object.
///
/// A guard may hold an invalid (null) key when creation failed; such a guard
/// releases nothing on drop.
pub struct Owned<K: GpuKey> {
    key: K,
    releaser: Option<Releaser>,
}

impl<K: GpuKey> Owned<K> {
    /// A guard that owns nothing.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            key: K::null(),
            releaser: None,
        }
    }

    /// The underlying key. Copies of it must not outlive the guard.
    #[inline]
    #[must_use]
    pub fn id(&self) -> K {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.key.is_null()
    }

    /// `Some(id)` for a valid guard.
    #[inline]
    #[must_use]
    pub fn valid_id(&self) -> Option<K> {
        self.is_valid().then_some(self.key)
    }
}

impl<K: GpuKey> Drop for Owned<K> {
    fn drop(&mut self) {
        if let Some(releaser) = self.releaser.take()
            && self.is_valid()
        {
            releaser.release(self.key.release_request());
        }
    }
}

impl<K: GpuKey> fmt::Debug for Owned<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.key).finish()
    }
}
