//! A poll-driven endpoint multiplexer for full-speed USB devices
//!
//! `usbdev-mux` sits between a USB device controller and the code that
//! implements individual endpoints. Endpoint code registers a handler for
//! the IN and / or OUT side of a hardware endpoint; the [`Mux`] drains the
//! controller's events on every [`poll()`](Mux::poll) and routes each one
//! to the handler that owns it.
//!
//! The multiplexer never touches registers. You provide a [`DeviceLink`]
//! for your controller, and a [`BufferPool`] for its packet buffers. The
//! multiplexer handles
//!
//! - per-endpoint registration, and the matching hardware enables.
//! - OUT NAK policy. A [`OutMode::Stream`] endpoint is re-armed after every
//!   packet. A [`OutMode::Message`] endpoint NAKs until its handler is ready
//!   for the next packet.
//! - link reset fan-out to every handler.
//! - periodic flush callbacks, so IN handlers can finish short transfers.
//!
//! Control transfers, descriptors, and enumeration are a higher layer's
//! job. Register that layer's handlers on endpoint 0 like any other.
//!
//! # Example
//!
//! See the [`mux`](crate::mux) module documentation.
//!
//! # Features
//!
//! `defmt-03` derives `defmt::Format` on the public types.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

mod buffer;
mod endpoints;
mod frame;
mod handler;
mod link;
pub mod mux;
mod registry;
mod shared;

#[cfg(test)]
mod mock;

pub use buffer::{Buffer, BufferPool};
pub use endpoints::Endpoints;
pub use frame::FLUSH_INTERVAL_FRAMES;
pub use handler::{InEndpoint, OutEndpoint, OutMode};
pub use link::{DeviceLink, EndpointMask, LinkEvents, PhyConfig, RxInfo};
pub use mux::{Mux, MAX_RX_PER_POLL};
pub use shared::SharedMux;

/// Number of hardware endpoints
///
/// Valid endpoint numbers are `0..NUM_ENDPOINTS`, and each endpoint has an
/// IN and an OUT side.
pub const NUM_ENDPOINTS: usize = 12;
