//! Endpoint registration table
//!
//! One IN slot and one OUT slot per hardware endpoint. The table only
//! does bookkeeping; hardware enables are driven by [`Endpoints`](crate::Endpoints).

use crate::handler::{InEndpoint, OutEndpoint, OutMode};
use crate::link::DeviceLink;
use crate::NUM_ENDPOINTS;

pub(crate) type InRef<'h, L> = &'h (dyn InEndpoint<'h, L> + 'h);
pub(crate) type OutRef<'h, L> = &'h (dyn OutEndpoint<'h, L> + 'h);

/// The state of an endpoint's OUT side
pub(crate) enum OutSlot<'h, L: DeviceLink> {
    /// Never registered, or removed
    Vacant,
    /// Registered with [`OutMode::Disabled`]
    Disabled,
    /// Registered with a handler. The mode is never `Disabled`.
    Active(OutMode, OutRef<'h, L>),
}

impl<L: DeviceLink> Clone for OutSlot<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: DeviceLink> Copy for OutSlot<'_, L> {}

impl<'h, L: DeviceLink> OutSlot<'h, L> {
    /// Returns the registered mode, or `None` if vacant
    pub(crate) fn mode(&self) -> Option<OutMode> {
        match *self {
            OutSlot::Vacant => None,
            OutSlot::Disabled => Some(OutMode::Disabled),
            OutSlot::Active(mode, _) => Some(mode),
        }
    }

    /// Returns the handler, if there is one
    pub(crate) fn handler(&self) -> Option<OutRef<'h, L>> {
        match *self {
            OutSlot::Active(_, handler) => Some(handler),
            _ => None,
        }
    }
}

pub(crate) struct Registry<'h, L: DeviceLink> {
    ins: [Option<InRef<'h, L>>; NUM_ENDPOINTS],
    outs: [OutSlot<'h, L>; NUM_ENDPOINTS],
    /// Bit `n` is set once endpoint `n` had an active OUT registration
    out_armed: u16,
}

impl<'h, L: DeviceLink> Registry<'h, L> {
    pub(crate) fn new() -> Self {
        Registry {
            ins: [None; NUM_ENDPOINTS],
            outs: [OutSlot::Vacant; NUM_ENDPOINTS],
            out_armed: 0,
        }
    }

    /// Returns the IN handler for `ep`
    ///
    /// The reference isn't tied to the registry, so the caller may mutate
    /// the registry while it holds the handler.
    pub(crate) fn in_handler(&self, ep: u8) -> Option<InRef<'h, L>> {
        self.ins[usize::from(ep)]
    }

    pub(crate) fn out_slot(&self, ep: u8) -> OutSlot<'h, L> {
        self.outs[usize::from(ep)]
    }

    /// Install or clear the IN registration, returning the previous one
    pub(crate) fn set_in(
        &mut self,
        ep: u8,
        handler: Option<InRef<'h, L>>,
    ) -> Option<InRef<'h, L>> {
        core::mem::replace(&mut self.ins[usize::from(ep)], handler)
    }

    /// Install or clear the OUT registration, returning the previous one
    pub(crate) fn set_out(&mut self, ep: u8, slot: OutSlot<'h, L>) -> OutSlot<'h, L> {
        if let OutSlot::Active(..) = slot {
            self.out_armed |= 1 << ep;
        }
        core::mem::replace(&mut self.outs[usize::from(ep)], slot)
    }

    /// Indicates if `ep` ever accepted OUT transactions
    ///
    /// If so, the link may still hold packets received before the OUT side
    /// was removed or disabled.
    pub(crate) fn out_was_armed(&self, ep: u8) -> bool {
        self.out_armed & (1 << ep) != 0
    }

    /// Indicates if either side of `ep` is registered
    pub(crate) fn is_registered(&self, ep: u8) -> bool {
        self.in_handler(ep).is_some() || self.out_slot(ep).mode().is_some()
    }
}
