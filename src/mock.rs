//! A simulated device controller, and recording handlers, for tests
//!
//! [`MockLink`] models the controller's buffer FIFOs and per-endpoint
//! enables. The `host_*` methods play the role of the host; they respect
//! the enables, so a refused OUT transaction is counted as a NAK.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use crate::buffer::{Buffer, BufferPool};
use crate::endpoints::Endpoints;
use crate::handler::{InEndpoint, OutEndpoint};
use crate::link::{DeviceLink, EndpointMask, LinkEvents, PhyConfig, RxInfo};
use crate::{Mux, NUM_ENDPOINTS};
use usb_device::{endpoint::EndpointAddress, UsbDirection, UsbError};

/// Default number of receive buffers the controller holds
const RX_DEPTH: usize = 4;

const MAX_PACKET_LEN: usize = 64;

pub struct MockPool {
    free: Vec<u8>,
}

impl MockPool {
    pub fn new(count: usize) -> Self {
        MockPool {
            free: (0..count as u8).rev().collect(),
        }
    }
}

impl BufferPool for MockPool {
    fn allocate(&mut self) -> Option<Buffer> {
        // Safety: each ID is either free, or owned by exactly one Buffer.
        self.free.pop().map(|id| unsafe { Buffer::from_id(id) })
    }

    fn release(&mut self, buffer: Buffer) {
        let id = buffer.into_id();
        assert!(!self.free.contains(&id), "Buffer {id} released twice");
        self.free.push(id);
    }

    fn available(&self) -> usize {
        self.free.len()
    }
}

fn bit(ep: u8) -> u16 {
    1 << ep
}

#[derive(Default)]
pub struct MockLink {
    phy: Option<PhyConfig>,
    fail_initialize: bool,
    shut_down: bool,

    events: LinkEvents,
    frame: u16,

    rx_depth: usize,
    rx_available: VecDeque<Buffer>,
    rx_fifo: VecDeque<(RxInfo, Buffer)>,
    contents: BTreeMap<u8, Vec<u8>>,

    in_enabled: u16,
    out_enabled: u16,
    out_ready: u16,
    nak_on_receive: u16,
    in_halted: u16,
    out_halted: u16,
    naks: [usize; NUM_ENDPOINTS],

    sending: [Option<(Buffer, usize)>; NUM_ENDPOINTS],
    sent: EndpointMask,
    sent_buffers: Vec<Buffer>,
}

impl MockLink {
    pub fn new() -> Self {
        MockLink {
            rx_depth: RX_DEPTH,
            ..Default::default()
        }
    }

    /// Hold up to `depth` receive buffers
    pub fn with_rx_depth(mut self, depth: usize) -> Self {
        self.rx_depth = depth;
        self
    }

    /// The next call to `initialize` fails
    pub fn fail_initialize(&mut self) {
        self.fail_initialize = true;
    }

    pub fn phy(&self) -> Option<PhyConfig> {
        self.phy
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn in_enabled(&self, ep: u8) -> bool {
        self.in_enabled & bit(ep) != 0
    }

    pub fn out_enabled(&self, ep: u8) -> bool {
        self.out_enabled & bit(ep) != 0
    }

    pub fn out_ready(&self, ep: u8) -> bool {
        self.out_ready & bit(ep) != 0
    }

    pub fn nak_on_receive(&self, ep: u8) -> bool {
        self.nak_on_receive & bit(ep) != 0
    }

    /// Number of OUT transactions refused on `ep`
    pub fn naks(&self, ep: u8) -> usize {
        self.naks[usize::from(ep)]
    }

    /// Number of buffers held by the controller
    pub fn buffers_outstanding(&self) -> usize {
        self.rx_available.len()
            + self.rx_fifo.len()
            + self.sending.iter().flatten().count()
            + self.sent_buffers.len()
    }

    pub fn halt(&mut self, addr: EndpointAddress) {
        let ep = addr.index() as u8;
        match addr.direction() {
            UsbDirection::In => self.in_halted |= bit(ep),
            UsbDirection::Out => self.out_halted |= bit(ep),
        }
    }

    pub fn host_frame(&mut self, frame: u16) {
        self.frame = frame;
        self.events |= LinkEvents::FRAME;
    }

    pub fn host_reset(&mut self) {
        self.events |= LinkEvents::LINK_RESET;
    }

    /// The host sends a DATA packet; returns `false` if the device NAKs
    pub fn host_out(&mut self, ep: u8, data: &[u8]) -> bool {
        if !self.out_enabled(ep) || !self.out_ready(ep) || !self.accept(ep, data, false) {
            self.naks[usize::from(ep)] += 1;
            return false;
        }
        if self.nak_on_receive(ep) {
            self.out_ready &= !bit(ep);
        }
        true
    }

    /// The host sends a SETUP packet; returns `false` if there's no room for it
    pub fn host_setup(&mut self, ep: u8, data: &[u8]) -> bool {
        self.out_enabled(ep) && self.accept(ep, data, true)
    }

    /// Queue a received packet, ignoring the endpoint's enables
    pub fn inject_out(&mut self, ep: u8, data: &[u8]) {
        assert!(self.accept(ep, data, false), "No receive buffer");
    }

    /// The host reads an IN packet; returns the data if one was queued
    pub fn host_in(&mut self, ep: u8) -> Option<Vec<u8>> {
        if !self.in_enabled(ep) {
            return None;
        }
        let (buffer, len) = self.sending[usize::from(ep)].take()?;
        let data = self.contents[&buffer.id()][..len].to_vec();
        self.sent.insert(ep);
        self.sent_buffers.push(buffer);
        Some(data)
    }

    /// Report an IN completion on `ep` without a queued packet
    pub fn host_ack(&mut self, ep: u8) {
        self.sent.insert(ep);
    }

    fn accept(&mut self, ep: u8, data: &[u8], setup: bool) -> bool {
        let Some(buffer) = self.rx_available.pop_front() else {
            return false;
        };
        self.contents.insert(buffer.id(), data.to_vec());
        let info = RxInfo {
            endpoint: ep,
            len: data.len() as u8,
            setup,
        };
        self.rx_fifo.push_back((info, buffer));
        true
    }
}

impl DeviceLink for MockLink {
    type Pool = MockPool;

    fn initialize(&mut self, phy: PhyConfig) -> Result<(), UsbError> {
        if self.fail_initialize {
            return Err(UsbError::Unsupported);
        }
        self.phy = Some(phy);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }

    fn events(&mut self) -> LinkEvents {
        core::mem::take(&mut self.events)
    }

    fn frame_number(&self) -> u16 {
        self.frame
    }

    fn supply_buffers(&mut self, pool: &mut MockPool) {
        while self.rx_available.len() < self.rx_depth {
            match pool.allocate() {
                Some(buffer) => self.rx_available.push_back(buffer),
                None => break,
            }
        }
    }

    fn take_sent(&mut self, pool: &mut MockPool) -> EndpointMask {
        for buffer in self.sent_buffers.drain(..) {
            pool.release(buffer);
        }
        core::mem::take(&mut self.sent)
    }

    fn receive(&mut self) -> Option<(RxInfo, Buffer)> {
        self.rx_fifo.pop_front()
    }

    fn set_endpoint_enabled(&mut self, addr: EndpointAddress, enabled: bool) {
        let ep = addr.index() as u8;
        let mask = match addr.direction() {
            UsbDirection::In => &mut self.in_enabled,
            UsbDirection::Out => &mut self.out_enabled,
        };
        if enabled {
            *mask |= bit(ep);
        } else {
            *mask &= !bit(ep);
        }
    }

    fn set_out_nak_on_receive(&mut self, ep: u8, nak: bool) {
        if nak {
            self.nak_on_receive |= bit(ep);
        } else {
            self.nak_on_receive &= !bit(ep);
        }
    }

    fn set_out_ready(&mut self, ep: u8, ready: bool) {
        if ready {
            self.out_ready |= bit(ep);
        } else {
            self.out_ready &= !bit(ep);
        }
    }

    fn is_halted(&self, addr: EndpointAddress) -> bool {
        let halted = match addr.direction() {
            UsbDirection::In => self.in_halted,
            UsbDirection::Out => self.out_halted,
        };
        halted & bit(addr.index() as u8) != 0
    }

    fn is_sending(&self, ep: u8) -> bool {
        self.sending[usize::from(ep)].is_some()
    }

    fn write(&mut self, buffer: &mut Buffer, data: &[u8]) -> usize {
        let len = data.len().min(MAX_PACKET_LEN);
        self.contents.insert(buffer.id(), data[..len].to_vec());
        len
    }

    fn read(&mut self, buffer: &Buffer, dst: &mut [u8]) -> usize {
        let src = self.contents.get(&buffer.id()).map_or(&[][..], Vec::as_slice);
        let len = src.len().min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
        len
    }

    fn send(&mut self, ep: u8, buffer: Buffer, len: usize) {
        let slot = &mut self.sending[usize::from(ep)];
        assert!(slot.is_none(), "EP{ep} is already sending");
        *slot = Some((buffer, len));
    }
}

/// A multiplexer on a link with 16 buffers, with receive buffers supplied
pub fn mux<'h>() -> Mux<'h, MockLink> {
    let mut mux = mux_with_buffers(16);
    mux.poll();
    mux
}

/// A multiplexer on a link with `count` buffers, all still in the pool
pub fn mux_with_buffers<'h>(count: usize) -> Mux<'h, MockLink> {
    Mux::init(MockLink::new(), MockPool::new(count), PhyConfig::empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    TransmitDone,
    Flush,
    InReset,
    Receive,
    Setup,
    OutReset,
}

/// Records handler callbacks, in order, across endpoints
#[derive(Default)]
pub struct Journal {
    calls: RefCell<Vec<(u8, Call)>>,
    received: RefCell<Vec<(u8, u8)>>,
}

impl Journal {
    fn record(&self, ep: u8, call: Call) {
        self.calls.borrow_mut().push((ep, call));
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    pub fn all(&self) -> Vec<(u8, Call)> {
        self.calls.borrow().clone()
    }

    pub fn calls(&self, ep: u8) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|(e, _)| *e == ep)
            .map(|&(_, call)| call)
            .collect()
    }

    pub fn count(&self, ep: u8, call: Call) -> usize {
        self.calls(ep).into_iter().filter(|c| *c == call).count()
    }

    /// Lengths of the packets delivered to `ep`
    pub fn received(&self, ep: u8) -> Vec<u8> {
        self.received
            .borrow()
            .iter()
            .filter(|(e, _)| *e == ep)
            .map(|&(_, len)| len)
            .collect()
    }
}

/// A handler that logs every callback, and returns received buffers
pub struct Recorder<'j> {
    endpoint: u8,
    journal: &'j Journal,
}

impl<'j> Recorder<'j> {
    pub fn new(endpoint: u8, journal: &'j Journal) -> Self {
        Recorder { endpoint, journal }
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }
}

impl<'h> InEndpoint<'h, MockLink> for Recorder<'_> {
    fn transmit_done(&self, _: &mut Endpoints<'h, MockLink>) {
        self.journal.record(self.endpoint, Call::TransmitDone);
    }

    fn flush(&self, _: &mut Endpoints<'h, MockLink>) {
        self.journal.record(self.endpoint, Call::Flush);
    }

    fn reset(&self, _: &mut Endpoints<'h, MockLink>) {
        self.journal.record(self.endpoint, Call::InReset);
    }
}

impl<'h> OutEndpoint<'h, MockLink> for Recorder<'_> {
    fn receive(&self, usb: &mut Endpoints<'h, MockLink>, info: RxInfo, buffer: Buffer) {
        assert_eq!(info.endpoint, self.endpoint);
        let call = if info.setup { Call::Setup } else { Call::Receive };
        self.journal.record(self.endpoint, call);

        let mut data = [0; MAX_PACKET_LEN];
        let len = usb.read(&buffer, &mut data);
        assert_eq!(len, usize::from(info.len));
        self.journal.received.borrow_mut().push((self.endpoint, info.len));
        usb.release(buffer);
    }

    fn reset(&self, _: &mut Endpoints<'h, MockLink>) {
        self.journal.record(self.endpoint, Call::OutReset);
    }
}
