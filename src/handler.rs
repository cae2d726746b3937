//! Endpoint handler interfaces
//!
//! A registrant implements [`InEndpoint`] for the IN side of an endpoint,
//! and [`OutEndpoint`] for the OUT side. The multiplexer holds shared
//! references to handlers, so handlers keep their state in `Cell`s or
//! `RefCell`s. One handler may implement both traits and be registered as
//! a pair.
//!
//! Every callback receives the [`Endpoints`] that dispatched it. Use it to
//! send packets, release buffers, clear OUT NAK, or change registrations.
//! Callbacks run inside [`Mux::poll()`](crate::Mux::poll) and must return
//! promptly.

use crate::buffer::Buffer;
use crate::endpoints::Endpoints;
use crate::link::{DeviceLink, RxInfo};

/// OUT transfer mode
///
/// Selects what happens to an OUT endpoint after a packet is delivered to
/// its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum OutMode {
    /// The endpoint doesn't accept OUT transactions
    Disabled,
    /// The endpoint is re-armed after every packet. The handler never
    /// needs to clear OUT NAK.
    Stream,
    /// The endpoint NAKs after every packet until the handler calls
    /// [`Endpoints::clear_out_nak()`].
    Message,
}

/// The IN side of an endpoint
pub trait InEndpoint<'h, L: DeviceLink> {
    /// The host acknowledged an IN packet sent on this endpoint
    fn transmit_done(&self, usb: &mut Endpoints<'h, L>);

    /// Called every [`FLUSH_INTERVAL_FRAMES`](crate::FLUSH_INTERVAL_FRAMES)
    /// frames of host time
    ///
    /// Use this to terminate a transfer with a short or empty packet. It's
    /// called whether or not the endpoint has anything queued.
    fn flush(&self, usb: &mut Endpoints<'h, L>) {
        let _ = usb;
    }

    /// The host reset the link
    ///
    /// Discard any assumptions about packets in flight.
    fn reset(&self, usb: &mut Endpoints<'h, L>) {
        let _ = usb;
    }
}

/// The OUT side of an endpoint
pub trait OutEndpoint<'h, L: DeviceLink> {
    /// The endpoint received a packet
    ///
    /// The handler owns `buffer`. Read it with [`Endpoints::read()`], then
    /// either [`release()`](Endpoints::release) it or hand it to the link.
    fn receive(&self, usb: &mut Endpoints<'h, L>, info: RxInfo, buffer: Buffer);

    /// The host reset the link
    fn reset(&self, usb: &mut Endpoints<'h, L>) {
        let _ = usb;
    }
}
