use std::fmt::{Debug, Formatter};
use crate::frame::{Frame, Packet};
use crate::sequence_number::SeqNr;

/// Identifies one arming of a timer. Re-arming or stopping a timer invalidates its id, which
///  allows the event loop to recognize and discard firings of timers that were cancelled after
///  their event was already queued.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TimerId(u64);

impl TimerId {
    pub fn from_raw(value: u64) -> TimerId {
        TimerId(value)
    }
}

/// Everything the protocol engine reacts to. The event loop processes these one at a time.
#[derive(Clone, Eq, PartialEq)]
pub enum ProtocolEvent {
    /// The network layer submitted a packet, which it only does if it was granted credit
    NetworkLayerReady(Packet),
    /// An undamaged frame arrived from the physical layer
    FrameArrival(Frame),
    /// A damaged frame arrived from the physical layer
    ChecksumError,
    /// The retransmission timer for a DATA frame expired
    Timeout { seq: SeqNr, timer: TimerId },
    /// The ACK timer expired without an outgoing frame to piggy-back the acknowledgement on
    AckTimeout { timer: TimerId },
    /// Something this protocol version does not know about, e.g. an intact frame of an
    ///  unknown kind
    Unrecognized(u8),
}

impl Debug for ProtocolEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolEvent::NetworkLayerReady(packet) => write!(f, "NETWORK_LAYER_READY({:?})", packet),
            ProtocolEvent::FrameArrival(frame) => write!(f, "FRAME_ARRIVAL({:?})", frame),
            ProtocolEvent::ChecksumError => write!(f, "CKSUM_ERR"),
            ProtocolEvent::Timeout { seq, timer } => write!(f, "TIMEOUT({}@{})", seq, timer.0),
            ProtocolEvent::AckTimeout { timer } => write!(f, "ACK_TIMEOUT(@{})", timer.0),
            ProtocolEvent::Unrecognized(code) => write!(f, "UNRECOGNIZED({})", code),
        }
    }
}
