//! Device link contract
//!
//! A [`DeviceLink`] is the hardware abstraction beneath the multiplexer.
//! It latches bus events (link reset, start of frame), reports which IN
//! endpoints finished a transaction, queues received OUT packets, and
//! exposes the per-endpoint enables that implement OUT NAK policy.
//!
//! The multiplexer never touches registers itself. Implement this trait
//! for your controller's driver, and supply it to [`Mux::init()`](crate::Mux::init).

use crate::buffer::{Buffer, BufferPool};
use crate::NUM_ENDPOINTS;
use usb_device::{endpoint::EndpointAddress, UsbError};

bitflags::bitflags! {
    /// PHY options applied when the link is initialized
    ///
    /// These are passed through to the link unchanged. The multiplexer
    /// doesn't interpret them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PhyConfig : u32 {
        /// Swap the D+ and D- lines
        const PINFLIP = 1 << 0;
        /// Use an external differential receiver, activating the single-ended D input
        const DIFF_RCVR = 1 << 1;
        /// Transmit with D / SE0 signaling, instead of Dp / Dn
        const TX_USE_D_SE0 = 1 << 2;
    }
}

impl PhyConfig {
    /// Build a PHY configuration from the three PHY switches
    pub fn new(pinflip: bool, en_diff_rcvr: bool, tx_use_d_se0: bool) -> Self {
        let mut config = PhyConfig::empty();
        config.set(PhyConfig::PINFLIP, pinflip);
        config.set(PhyConfig::DIFF_RCVR, en_diff_rcvr);
        config.set(PhyConfig::TX_USE_D_SE0, tx_use_d_se0);
        config
    }
}

bitflags::bitflags! {
    /// Latched bus events
    ///
    /// Packet-level events aren't represented here. The multiplexer always
    /// drains [`DeviceLink::take_sent()`] and [`DeviceLink::receive()`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LinkEvents : u32 {
        /// The host reset the link since the last poll
        const LINK_RESET = 1 << 0;
        /// At least one start-of-frame arrived since the last poll
        const FRAME = 1 << 1;
    }
}

/// A set of endpoint numbers
///
/// Bit `n` represents endpoint `n`. Iteration is in ascending endpoint
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct EndpointMask(u16);

impl EndpointMask {
    /// A mask with no endpoints
    pub const fn empty() -> Self {
        EndpointMask(0)
    }

    /// Create a mask from raw bits
    ///
    /// Bits at or above [`NUM_ENDPOINTS`] are kept. The multiplexer treats
    /// them as a link fault when it dispatches.
    pub const fn from_bits(bits: u16) -> Self {
        EndpointMask(bits)
    }

    /// Returns the raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Add endpoint `ep` to the set
    ///
    /// # Panics
    ///
    /// Panics if `ep` is 16 or greater.
    pub fn insert(&mut self, ep: u8) {
        assert!(ep < 16, "Endpoint {} doesn't fit in a mask", ep);
        self.0 |= 1 << ep;
    }

    /// Indicates if endpoint `ep` is in the set
    pub const fn contains(self, ep: u8) -> bool {
        ep < 16 && self.0 & (1 << ep) != 0
    }

    /// Indicates if the set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over endpoint numbers, lowest first
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..16u8).filter(move |&ep| self.contains(ep))
    }
}

/// Describes a received OUT transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct RxInfo {
    /// The endpoint that received the packet
    pub endpoint: u8,
    /// Number of bytes in the packet
    pub len: u8,
    /// `true` for a SETUP packet, `false` for a DATA packet
    pub setup: bool,
}

/// The hardware abstraction driven by the multiplexer
///
/// All methods take endpoint numbers below [`NUM_ENDPOINTS`]; the
/// multiplexer checks this before calling.
pub trait DeviceLink {
    /// The pool that supplies this link's packet buffers
    type Pool: BufferPool;

    /// Bring the controller up with the given PHY configuration
    ///
    /// After this call, the device is present on the bus, but it's not
    /// signaling a connection.
    fn initialize(&mut self, phy: PhyConfig) -> Result<(), UsbError>;

    /// Return the controller to an inert state
    fn shutdown(&mut self);

    /// Read, then acknowledge, the latched bus events
    fn events(&mut self) -> LinkEvents;

    /// Returns the most recent bus frame number
    fn frame_number(&self) -> u16;

    /// Move free buffers from the pool into the controller so that it can
    /// keep receiving
    fn supply_buffers(&mut self, pool: &mut Self::Pool);

    /// Returns the IN endpoints that completed a transaction since the last
    /// call
    ///
    /// The link returns each transmitted buffer to `pool` before returning.
    fn take_sent(&mut self, pool: &mut Self::Pool) -> EndpointMask;

    /// Pop the oldest received OUT packet
    fn receive(&mut self) -> Option<(RxInfo, Buffer)>;

    /// Enable or disable an endpoint in hardware
    ///
    /// A disabled endpoint produces no events in that direction.
    fn set_endpoint_enabled(&mut self, addr: EndpointAddress, enabled: bool);

    /// When `true`, the controller NAKs further OUT transactions on `ep`
    /// after accepting one, until software calls
    /// [`set_out_ready()`](DeviceLink::set_out_ready)
    fn set_out_nak_on_receive(&mut self, ep: u8, nak: bool);

    /// Allow (`true`) or refuse (`false`) the next OUT transaction on `ep`
    fn set_out_ready(&mut self, ep: u8, ready: bool);

    /// Indicates if `addr` is halted because of an error condition
    fn is_halted(&self, addr: EndpointAddress) -> bool;

    /// Indicates if an IN packet is queued, but not yet acknowledged, on `ep`
    fn is_sending(&self, ep: u8) -> bool;

    /// Copy `data` into `buffer`, returning the number of bytes copied
    fn write(&mut self, buffer: &mut Buffer, data: &[u8]) -> usize;

    /// Copy up to `dst.len()` received bytes out of `buffer`
    fn read(&mut self, buffer: &Buffer, dst: &mut [u8]) -> usize;

    /// Queue `buffer`, holding `len` bytes, for transmission on IN endpoint `ep`
    fn send(&mut self, ep: u8, buffer: Buffer, len: usize);

    /// Returns the maximum packet size of the link
    fn max_packet_len(&self) -> usize {
        64
    }
}

const _: [(); 1] = [(); (NUM_ENDPOINTS <= 16) as usize];
