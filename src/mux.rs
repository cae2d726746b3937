//! Lifecycle and dispatch core
//!
//! A [`Mux`] owns the device link, its buffer pool, and the endpoint
//! registrations. Call [`poll()`](Mux::poll) repeatedly; each call drains
//! the link's pending events and dispatches them to endpoint handlers.
//!
//! ## Dispatch order
//!
//! Each poll performs these steps, in order:
//!
//! 1. Top up the link's receive buffers from the pool.
//! 2. On a link reset, call every registered handler's `reset()`. For each
//!    endpoint, lowest first, the IN handler runs before the OUT handler.
//!    Frame tracking restarts, and a frame tick reported alongside the
//!    reset is ignored.
//! 3. Otherwise, on a frame tick, record the frame number. Every
//!    [`FLUSH_INTERVAL_FRAMES`] frames, call every IN handler's `flush()`.
//! 4. Call `transmit_done()` for each acknowledged IN packet, lowest
//!    endpoint first.
//! 5. Deliver up to [`MAX_RX_PER_POLL`] received OUT packets, in the order
//!    the link received them.
//!
//! All IN completions of a poll are dispatched before any OUT packet of
//! the same poll. A request / response handler therefore learns that its
//! previous response went out before it sees the next request.
//!
//! Events for endpoints without a registration are dropped. A dropped OUT
//! packet's buffer goes back to the pool.

use core::ops::{Deref, DerefMut};

use crate::endpoints::Endpoints;
use crate::handler::OutMode;
use crate::link::{DeviceLink, LinkEvents, PhyConfig};
use crate::registry::OutSlot;
use crate::{FLUSH_INTERVAL_FRAMES, NUM_ENDPOINTS};
use usb_device::UsbError;

/// Maximum number of OUT packets delivered per poll
///
/// Matches the depth of the controller's receive FIFO. Any packets beyond
/// this remain queued in the link until the next poll.
pub const MAX_RX_PER_POLL: usize = 8;

/// A USB endpoint multiplexer
///
/// `Mux` dereferences to [`Endpoints`], which has the registration API.
///
/// # Example
///
/// ```no_run
/// use usbdev_mux::{DeviceLink, Endpoints, InEndpoint, Mux, OutEndpoint, OutMode, PhyConfig, RxInfo, Buffer};
/// use core::cell::Cell;
///
/// /// Sends every OUT packet back to the host.
/// struct Loopback {
///     pending: Cell<bool>,
/// }
///
/// impl<'h, L: DeviceLink> InEndpoint<'h, L> for Loopback {
///     fn transmit_done(&self, usb: &mut Endpoints<'h, L>) {
///         // The response is out; accept the next request.
///         self.pending.set(false);
///         usb.clear_out_nak(1);
///     }
/// }
///
/// impl<'h, L: DeviceLink> OutEndpoint<'h, L> for Loopback {
///     fn receive(&self, usb: &mut Endpoints<'h, L>, info: RxInfo, buffer: Buffer) {
///         let mut data = [0; 64];
///         let len = usb.read(&buffer, &mut data[..usize::from(info.len)]);
///         usb.release(buffer);
///         self.pending.set(usb.send(1, &data[..len]).is_ok());
///     }
/// }
///
/// fn run<L: DeviceLink>(link: L, pool: L::Pool) -> ! {
///     let loopback = Loopback { pending: Cell::new(false) };
///     let mut mux = Mux::init(link, pool, PhyConfig::new(false, false, false));
///     mux.setup_pair(1, OutMode::Message, &loopback);
///     loop {
///         mux.poll();
///     }
/// }
/// ```
pub struct Mux<'h, L: DeviceLink> {
    usb: Endpoints<'h, L>,
}

impl<'h, L: DeviceLink> Mux<'h, L> {
    /// Initialize the link, and create a multiplexer with no registrations
    ///
    /// The device is present on the bus, but it's not connected. Connecting
    /// is up to the link; see [`Endpoints::link_mut()`].
    ///
    /// # Errors
    ///
    /// Returns the link's error if it fails to initialize.
    pub fn try_init(mut link: L, pool: L::Pool, phy: PhyConfig) -> Result<Self, UsbError> {
        link.initialize(phy)?;
        debug!("INIT {:?}", phy);
        Ok(Mux {
            usb: Endpoints::new(link, pool),
        })
    }

    /// Initialize the link, and create a multiplexer with no registrations
    ///
    /// # Panics
    ///
    /// Panics if the link fails to initialize. That's a hardware fault that
    /// this layer can't recover from.
    pub fn init(link: L, pool: L::Pool, phy: PhyConfig) -> Self {
        match Self::try_init(link, pool, phy) {
            Ok(mux) => mux,
            Err(err) => panic!("USB link failed to initialize: {:?}", err),
        }
    }

    /// Drain and dispatch pending link events
    ///
    /// Never blocks. See the [module documentation](crate::mux) for the
    /// dispatch order.
    pub fn poll(&mut self) {
        let usb = &mut self.usb;
        usb.link.supply_buffers(&mut usb.pool);

        let events = usb.link.events();
        if events.contains(LinkEvents::LINK_RESET) {
            self.link_reset();
        } else if events.contains(LinkEvents::FRAME) {
            let frame = self.usb.link.frame_number();
            if self.usb.frames.tick(frame) {
                self.flush();
            }
        }

        self.transmit_complete();
        self.receive();
    }

    /// Shut down the link, returning it and its pool
    ///
    /// Every registered endpoint is disabled in hardware. Consuming the
    /// multiplexer releases all handler borrows.
    pub fn fin(mut self) -> (L, L::Pool) {
        for ep in 0..NUM_ENDPOINTS as u8 {
            if self.usb.registry.is_registered(ep) {
                self.usb.remove_pair(ep);
            }
        }
        self.usb.link.shutdown();
        debug!("FIN");

        let Endpoints { link, pool, .. } = self.usb;
        (link, pool)
    }

    fn link_reset(&mut self) {
        debug!("LINK RESET");
        self.usb.frames.reset();

        for ep in 0..NUM_ENDPOINTS as u8 {
            if let Some(handler) = self.usb.registry.in_handler(ep) {
                handler.reset(&mut self.usb);
            }
            if let Some(handler) = self.usb.registry.out_slot(ep).handler() {
                handler.reset(&mut self.usb);
            }
        }
    }

    fn flush(&mut self) {
        trace!("FLUSH {:?}", self.usb.frames.frame());
        for ep in 0..NUM_ENDPOINTS as u8 {
            if let Some(handler) = self.usb.registry.in_handler(ep) {
                handler.flush(&mut self.usb);
            }
        }
    }

    fn transmit_complete(&mut self) {
        let usb = &mut self.usb;
        let sent = usb.link.take_sent(&mut usb.pool);

        for ep in sent.iter() {
            assert!(
                usize::from(ep) < NUM_ENDPOINTS,
                "Link reported an IN completion on EP{}",
                ep
            );
            // A handler earlier in this loop may have removed this one.
            match self.usb.registry.in_handler(ep) {
                Some(handler) => handler.transmit_done(&mut self.usb),
                None => {
                    debug!("EP{} IN STALE COMPLETION", ep);
                }
            }
        }
    }

    fn receive(&mut self) {
        for _ in 0..MAX_RX_PER_POLL {
            let Some((info, buffer)) = self.usb.link.receive() else {
                break;
            };
            let ep = info.endpoint;
            assert!(
                usize::from(ep) < NUM_ENDPOINTS,
                "Link reported an OUT packet on EP{}",
                ep
            );

            match self.usb.registry.out_slot(ep) {
                OutSlot::Active(_, handler) => {
                    handler.receive(&mut self.usb, info, buffer);
                    // Respect a handler that removed or replaced itself.
                    if let Some(OutMode::Stream) = self.usb.registry.out_slot(ep).mode() {
                        self.usb.link.set_out_ready(ep, true);
                    }
                }
                OutSlot::Vacant => {
                    warn!("EP{} OUT STALE PACKET {}", ep, info.len);
                    self.usb.release(buffer);
                }
                // Accepted before the endpoint was switched to disabled.
                OutSlot::Disabled if self.usb.registry.out_was_armed(ep) => {
                    warn!("EP{} OUT STALE PACKET {}", ep, info.len);
                    self.usb.release(buffer);
                }
                OutSlot::Disabled => {
                    panic!("EP{} received an OUT packet, but its OUT side is disabled", ep)
                }
            }
        }
    }
}

impl<'h, L: DeviceLink> Deref for Mux<'h, L> {
    type Target = Endpoints<'h, L>;
    fn deref(&self) -> &Self::Target {
        &self.usb
    }
}

impl<'h, L: DeviceLink> DerefMut for Mux<'h, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.usb
    }
}
