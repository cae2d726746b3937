//! Transfer buffers
//!
//! The device controller owns a fixed set of packet buffers. This crate never
//! allocates them; it only moves [`Buffer`] handles between the link, the
//! pool, and endpoint handlers.

/// A handle to one hardware packet buffer
///
/// A `Buffer` is single-owner. It can't be copied or cloned, so each
/// handle is either held by a handler, queued in the link, or sitting in
/// the [`BufferPool`]. Dropping a `Buffer` leaks the underlying hardware
/// buffer until the controller is reinitialized; give it back with
/// [`Endpoints::release()`](crate::Endpoints::release) instead.
#[must_use = "return the buffer to the pool, or hand it to the link"]
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Buffer {
    id: u8,
}

impl Buffer {
    /// Create a handle for the hardware buffer `id`
    ///
    /// # Safety
    ///
    /// `id` must name a buffer that no other live `Buffer` names. Only link
    /// and pool implementations should create buffers.
    pub const unsafe fn from_id(id: u8) -> Self {
        Buffer { id }
    }

    /// Returns the hardware buffer ID
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// Consume the handle, returning the hardware buffer ID
    ///
    /// After this call, the caller is responsible for the buffer.
    pub fn into_id(self) -> u8 {
        self.id
    }
}

/// A pool of free transfer buffers
///
/// Implementations typically wrap the controller's buffer bookkeeping.
/// The multiplexer passes the pool to the link when the link needs
/// buffers for reception, or needs to free buffers after a transmission.
pub trait BufferPool {
    /// Take a free buffer from the pool
    ///
    /// Returns `None` if the pool is exhausted.
    fn allocate(&mut self) -> Option<Buffer>;

    /// Return a buffer to the pool
    fn release(&mut self, buffer: Buffer);

    /// Returns the number of free buffers
    fn available(&self) -> usize;
}

