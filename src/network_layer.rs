use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
#[cfg(test)] use mockall::automock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, trace, warn};
use crate::frame::Packet;

/// The protocol engine's view of the host above it: packets received in sequence are handed up,
///  and the host is told how many packets it may submit.
///
/// Packets submitted by the host reach the engine through its
///  [crate::event_source::EventSource] as NETWORK_LAYER_READY events.
///
/// None of these calls wait. A host that does not keep up with delivered packets reports `false`
///  from [NetworkLayer::is_ready_for_delivery], and the engine keeps the packets buffered in its
///  receive window until the host catches up.
#[cfg_attr(test, automock)]
pub trait NetworkLayer: Send + Sync + 'static {
    /// grants credit for `n` more packets
    fn enable_network_layer(&self, n: usize);

    /// `true` iff the next call to [NetworkLayer::to_network_layer] is guaranteed to be accepted
    fn is_ready_for_delivery(&self) -> bool;

    fn to_network_layer(&self, packet: Packet);
}

/// The number of packets the host may submit before the engine grants more credit. This is shared
///  between the engine (which grants credit) and the event source (which consumes it).
#[derive(Clone, Default, Debug)]
pub struct Credit(Arc<AtomicUsize>);

impl Credit {
    pub fn new() -> Credit {
        Credit::default()
    }

    pub fn grant(&self, n: usize) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }

    pub fn available(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_available(&self) -> bool {
        self.available() > 0
    }

    /// Takes one unit of credit if there is any, returning whether it did
    pub fn consume(&self) -> bool {
        self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Delivers packets into a channel and keeps granted credit in a [Credit] counter
pub struct ChannelNetworkLayer {
    delivered: mpsc::Sender<Packet>,
    credit: Credit,
}

impl ChannelNetworkLayer {
    pub fn new(delivered: mpsc::Sender<Packet>, credit: Credit) -> ChannelNetworkLayer {
        ChannelNetworkLayer { delivered, credit }
    }
}

impl NetworkLayer for ChannelNetworkLayer {
    fn enable_network_layer(&self, n: usize) {
        self.credit.grant(n);
        trace!("granted {} credit, {} available", n, self.credit.available());
    }

    fn is_ready_for_delivery(&self) -> bool {
        // NB: the engine is the only sender, so free capacity can not be taken away between this
        //  check and the subsequent delivery
        self.delivered.capacity() > 0 || self.delivered.is_closed()
    }

    fn to_network_layer(&self, packet: Packet) {
        match self.delivered.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => error!("network layer is gone - dropping delivered packet"),
            Err(TrySendError::Full(_)) => warn!("delivery queue is full - dropping packet delivered without checking readiness"),
        }
    }
}
