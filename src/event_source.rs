use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{info, trace};
use crate::event::ProtocolEvent;
use crate::frame::{DecodedFrame, Frame, Packet};
use crate::network_layer::Credit;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event. `None` means that the engine is disconnected from its link and
    ///  should terminate.
    async fn wait_for_event(&mut self) -> Option<ProtocolEvent>;
}

/// Multiplexes the engine's inputs, all of which are channels:
///  * raw frames from the physical layer, decoded into FRAME_ARRIVAL, CKSUM_ERR or unrecognized
///    events
///  * timer firings
///  * packets submitted by the host, which are only taken while there is credit for them
pub struct ChannelEventSource {
    frames: mpsc::Receiver<Bytes>,
    timer_events: mpsc::UnboundedReceiver<ProtocolEvent>,
    packets: mpsc::Receiver<Packet>,
    credit: Credit,
}

impl ChannelEventSource {
    pub fn new(frames: mpsc::Receiver<Bytes>, timer_events: mpsc::UnboundedReceiver<ProtocolEvent>, packets: mpsc::Receiver<Packet>, credit: Credit) -> ChannelEventSource {
        ChannelEventSource { frames, timer_events, packets, credit }
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn wait_for_event(&mut self) -> Option<ProtocolEvent> {
        // NB: credit is granted by the engine between calls, never while we are waiting here, so
        //  evaluating the precondition once per call is sufficient
        let has_credit = self.credit.is_available();

        select! {
            raw = self.frames.recv() => {
                match raw {
                    Some(raw) => Some(frame_event(&raw)),
                    None => {
                        info!("physical layer closed");
                        None
                    }
                }
            }
            Some(event) = self.timer_events.recv() => {
                Some(event)
            }
            Some(packet) = self.packets.recv(), if has_credit => {
                let consumed = self.credit.consume();
                debug_assert!(consumed, "credit was checked before");
                Some(ProtocolEvent::NetworkLayerReady(packet))
            }
        }
    }
}

fn frame_event(raw: &[u8]) -> ProtocolEvent {
    match Frame::deser(raw) {
        DecodedFrame::Intact(frame) => {
            trace!("received {:?}", frame);
            ProtocolEvent::FrameArrival(frame)
        }
        DecodedFrame::Damaged => ProtocolEvent::ChecksumError,
        DecodedFrame::UnknownKind(kind) => ProtocolEvent::Unrecognized(kind),
    }
}
