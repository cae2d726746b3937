//! Sharing a multiplexer with an interrupt handler
//!
//! [`SharedMux`] lets a USB interrupt handler and the main loop both drive
//! the same [`Mux`]. Every access runs in a critical section.

use crate::link::DeviceLink;
use crate::mux::Mux;
use core::cell::RefCell;
use cortex_m::interrupt::{self, CriticalSection, Mutex};

/// A [`Mux`] behind an interrupt-safe mutex
///
/// Place a `SharedMux` in a `static`, or in a resource of your RTIC-like
/// framework, then call [`poll()`](SharedMux::poll) from the USB interrupt.
pub struct SharedMux<'h, L: DeviceLink> {
    mux: Mutex<RefCell<Mux<'h, L>>>,
}

impl<'h, L: DeviceLink> SharedMux<'h, L> {
    /// Wrap `mux` so that it can be shared with an interrupt handler
    pub fn new(mux: Mux<'h, L>) -> Self {
        SharedMux {
            mux: Mutex::new(RefCell::new(mux)),
        }
    }

    /// Interrupt-safe, mutable access to the multiplexer
    ///
    /// # Panics
    ///
    /// Panics if called from within `func`.
    pub fn with_mux<R>(&self, func: impl FnOnce(&mut Mux<'h, L>) -> R) -> R {
        interrupt::free(|cs| self.borrow_mut(cs, func))
    }

    /// Mutable access to the multiplexer inside an existing critical section
    ///
    /// # Panics
    ///
    /// Panics if called from within `func`.
    pub fn borrow_mut<R>(
        &self,
        cs: &CriticalSection,
        func: impl FnOnce(&mut Mux<'h, L>) -> R,
    ) -> R {
        let mux = self.mux.borrow(cs);
        let mut mux = mux.borrow_mut();
        func(&mut *mux)
    }

    /// Drain and dispatch pending link events
    ///
    /// See [`Mux::poll()`].
    pub fn poll(&self) {
        self.with_mux(|mux| mux.poll());
    }
}
