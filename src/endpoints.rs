//! Endpoint registrations, and the adapters they act on
//!
//! [`Endpoints`] is the state that's shared between the dispatch core and
//! endpoint handlers. Handlers receive it in every callback, so a callback
//! can register or remove endpoints, re-arm OUT reception, and exchange
//! buffers with the link while the multiplexer is dispatching.

use crate::buffer::{Buffer, BufferPool};
use crate::frame::FrameTracker;
use crate::handler::{InEndpoint, OutEndpoint, OutMode};
use crate::link::DeviceLink;
use crate::registry::{OutSlot, Registry};
use crate::NUM_ENDPOINTS;
use usb_device::{endpoint::EndpointAddress, UsbDirection, UsbError};

/// Panics if `ep` isn't a hardware endpoint
#[track_caller]
pub(crate) fn check_endpoint(ep: u8) {
    assert!(
        usize::from(ep) < NUM_ENDPOINTS,
        "Endpoint {} is out of range; the device has {} endpoints",
        ep,
        NUM_ENDPOINTS
    );
}

fn in_addr(ep: u8) -> EndpointAddress {
    EndpointAddress::from_parts(usize::from(ep), UsbDirection::In)
}

fn out_addr(ep: u8) -> EndpointAddress {
    EndpointAddress::from_parts(usize::from(ep), UsbDirection::Out)
}

/// Endpoint registrations, the device link, and its buffer pool
///
/// You'll find an `Endpoints` behind a [`Mux`](crate::Mux), and as the
/// argument of every handler callback. All methods that take an endpoint
/// number panic if the number is not less than [`NUM_ENDPOINTS`].
pub struct Endpoints<'h, L: DeviceLink> {
    pub(crate) link: L,
    pub(crate) pool: L::Pool,
    pub(crate) registry: Registry<'h, L>,
    pub(crate) frames: FrameTracker,
}

impl<'h, L: DeviceLink> Endpoints<'h, L> {
    pub(crate) fn new(link: L, pool: L::Pool) -> Self {
        Endpoints {
            link,
            pool,
            registry: Registry::new(),
            frames: FrameTracker::new(),
        }
    }

    /// Register `handler` as the IN side of `ep`
    ///
    /// Replaces any existing IN registration, and enables the IN endpoint
    /// in hardware.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn setup_in(&mut self, ep: u8, handler: &'h (dyn InEndpoint<'h, L> + 'h)) {
        check_endpoint(ep);
        if self.registry.set_in(ep, Some(handler)).is_some() {
            debug!("EP{} IN REPLACED", ep);
        }
        self.link.set_endpoint_enabled(in_addr(ep), true);
        debug!("EP{} IN SETUP", ep);
    }

    /// Register `handler` as the OUT side of `ep`
    ///
    /// Replaces any existing OUT registration. `mode` decides whether the
    /// endpoint is re-armed after every packet ([`OutMode::Stream`]), or
    /// waits for [`clear_out_nak()`](Endpoints::clear_out_nak) ([`OutMode::Message`]).
    ///
    /// [`OutMode::Disabled`] is the same as having no OUT handler; `handler`
    /// isn't retained, and the hardware won't accept OUT transactions on `ep`.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn setup_out(
        &mut self,
        ep: u8,
        mode: OutMode,
        handler: &'h (dyn OutEndpoint<'h, L> + 'h),
    ) {
        check_endpoint(ep);
        match mode {
            OutMode::Disabled => {
                self.registry.set_out(ep, OutSlot::Disabled);
                self.disable_out(ep);
            }
            OutMode::Stream | OutMode::Message => {
                self.registry.set_out(ep, OutSlot::Active(mode, handler));
                self.link
                    .set_out_nak_on_receive(ep, mode == OutMode::Message);
                self.link.set_endpoint_enabled(out_addr(ep), true);
                self.link.set_out_ready(ep, true);
            }
        }
        debug!("EP{} OUT SETUP {:?}", ep, mode);
    }

    /// Register `handler` as both sides of `ep`
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn setup_pair<H>(&mut self, ep: u8, mode: OutMode, handler: &'h H)
    where
        H: InEndpoint<'h, L> + OutEndpoint<'h, L> + 'h,
    {
        self.setup_in(ep, handler);
        self.setup_out(ep, mode, handler);
    }

    /// Remove the IN registration of `ep`, and disable the IN endpoint
    ///
    /// No IN callback runs for `ep` after this call, even if the hardware
    /// already reported a completion. Removing an unregistered endpoint does
    /// nothing.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn remove_in(&mut self, ep: u8) {
        check_endpoint(ep);
        if self.registry.set_in(ep, None).is_some() {
            self.link.set_endpoint_enabled(in_addr(ep), false);
            debug!("EP{} IN REMOVED", ep);
        }
    }

    /// Remove the OUT registration of `ep`, and stop OUT reception
    ///
    /// Removing an unregistered endpoint does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn remove_out(&mut self, ep: u8) {
        check_endpoint(ep);
        let previous = self.registry.set_out(ep, OutSlot::Vacant);
        if previous.mode().is_some() {
            self.disable_out(ep);
            debug!("EP{} OUT REMOVED", ep);
        }
    }

    /// Remove both sides of `ep`
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn remove_pair(&mut self, ep: u8) {
        self.remove_in(ep);
        self.remove_out(ep);
    }

    /// Re-arm `ep` for the next OUT transaction
    ///
    /// Required after every packet received in [`OutMode::Message`]. It's
    /// harmless to call this more than once, or for a [`OutMode::Stream`]
    /// endpoint. It does nothing if `ep` has no active OUT registration.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn clear_out_nak(&mut self, ep: u8) {
        check_endpoint(ep);
        if self.registry.out_slot(ep).handler().is_some() {
            self.link.set_out_ready(ep, true);
        } else {
            trace!("EP{} OUT NAK CLEAR IGNORED", ep);
        }
    }

    /// Indicates if `addr` is halted because of an error condition
    ///
    /// The link reports the halt; this call doesn't change any state.
    /// Clearing the halt is up to the link.
    ///
    /// # Panics
    ///
    /// Panics if the endpoint index is out of range.
    pub fn endpoint_halted(&self, addr: EndpointAddress) -> bool {
        let ep = u8::try_from(addr.index()).unwrap_or(u8::MAX);
        check_endpoint(ep);
        self.link.is_halted(addr)
    }

    /// Indicates if `ep` has an IN registration
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn in_registered(&self, ep: u8) -> bool {
        check_endpoint(ep);
        self.registry.in_handler(ep).is_some()
    }

    /// Returns the OUT mode of `ep`, or `None` if `ep` has no OUT registration
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn out_mode(&self, ep: u8) -> Option<OutMode> {
        check_endpoint(ep);
        self.registry.out_slot(ep).mode()
    }

    /// Send `data` as one IN packet on `ep`
    ///
    /// Takes a buffer from the pool, fills it, and queues it on the link.
    /// The link frees the buffer once the host acknowledges the packet,
    /// and the IN handler's [`transmit_done()`](InEndpoint::transmit_done) runs
    /// on a later poll.
    ///
    /// # Errors
    ///
    /// - [`UsbError::InvalidEndpoint`] if `ep` has no IN registration.
    /// - [`UsbError::BufferOverflow`] if `data` doesn't fit in one packet.
    /// - [`UsbError::WouldBlock`] if a packet is still waiting for the host.
    /// - [`UsbError::EndpointMemoryOverflow`] if the pool is empty.
    ///
    /// # Panics
    ///
    /// Panics if `ep` is out of range.
    pub fn send(&mut self, ep: u8, data: &[u8]) -> Result<(), UsbError> {
        check_endpoint(ep);
        if self.registry.in_handler(ep).is_none() {
            return Err(UsbError::InvalidEndpoint);
        }
        if data.len() > self.link.max_packet_len() {
            return Err(UsbError::BufferOverflow);
        }
        if self.link.is_sending(ep) {
            return Err(UsbError::WouldBlock);
        }

        let mut buffer = self
            .pool
            .allocate()
            .ok_or(UsbError::EndpointMemoryOverflow)?;
        let written = self.link.write(&mut buffer, data);
        self.link.send(ep, buffer, written);
        trace!("EP{} IN SEND {}", ep, written);
        Ok(())
    }

    /// Copy the contents of a received `buffer` into `dst`
    ///
    /// Returns the number of bytes copied.
    pub fn read(&mut self, buffer: &Buffer, dst: &mut [u8]) -> usize {
        self.link.read(buffer, dst)
    }

    /// Return `buffer` to the pool
    pub fn release(&mut self, buffer: Buffer) {
        self.pool.release(buffer);
    }

    /// Returns the most recent bus frame number, if a frame was observed since
    /// initialization or the last link reset
    pub fn frame(&self) -> Option<u16> {
        self.frames.frame()
    }

    /// Indicates if a frame arrived since the flag was last taken
    pub fn got_frame(&self) -> bool {
        self.frames.got_frame()
    }

    /// Returns, then clears, the frame-observed flag
    pub fn take_got_frame(&mut self) -> bool {
        self.frames.take_got_frame()
    }

    /// Access the device link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Mutably access the device link
    ///
    /// Use this for link operations outside of the multiplexer's scope, like
    /// connecting to the bus. Don't use it to change endpoint enables behind
    /// the multiplexer's back.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Access the buffer pool
    pub fn pool(&self) -> &L::Pool {
        &self.pool
    }

    /// Mutably access the buffer pool
    pub fn pool_mut(&mut self) -> &mut L::Pool {
        &mut self.pool
    }

    /// Refuse OUT transactions on `ep`, and disable the OUT endpoint
    fn disable_out(&mut self, ep: u8) {
        self.link.set_out_ready(ep, false);
        self.link.set_out_nak_on_receive(ep, false);
        self.link.set_endpoint_enabled(out_addr(ep), false);
    }
}
