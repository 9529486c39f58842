use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use crate::event::{ProtocolEvent, TimerId};
use crate::event_source::EventSource;
use crate::frame::{Frame, FrameKind, Packet};
use crate::network_layer::NetworkLayer;
use crate::physical_layer::PhysicalLayer;
use crate::sequence_number::{SeqNr, NR_BUFS};
use crate::stats::ProtocolStats;
use crate::timer::ProtocolTimers;
use crate::window::{ReceiverWindow, SenderWindow};

/// The selective repeat protocol engine ("protocol 6"): reliable, in-order delivery over a link
///  that loses, corrupts, duplicates and reorders frames.
///
/// The engine owns all protocol state and mutates it only in [Protocol6::on_event], so all
///  processing is serialized through the event loop without any locking. Collaborators never call
///  into the engine: timers, the physical layer and the network layer produce events which the
///  event loop feeds into the engine one at a time.
pub struct Protocol6 {
    physical_layer: Arc<dyn PhysicalLayer>,
    network_layer: Arc<dyn NetworkLayer>,
    timers: Box<dyn ProtocolTimers>,
    sender: SenderWindow,
    receiver: ReceiverWindow,
    /// `false` while a NAK is outstanding, i.e. until the expected frame is delivered
    no_nak: bool,
    stats: ProtocolStats,
}

impl Protocol6 {
    pub fn new(physical_layer: Arc<dyn PhysicalLayer>, network_layer: Arc<dyn NetworkLayer>, timers: Box<dyn ProtocolTimers>) -> Protocol6 {
        Protocol6 {
            physical_layer,
            network_layer,
            timers,
            sender: SenderWindow::new(),
            receiver: ReceiverWindow::new(),
            no_nak: true,
            stats: ProtocolStats::default(),
        }
    }

    pub fn sender_window(&self) -> &SenderWindow {
        &self.sender
    }

    pub fn receiver_window(&self) -> &ReceiverWindow {
        &self.receiver
    }

    pub fn no_nak(&self) -> bool {
        self.no_nak
    }

    pub fn stats(&self) -> &ProtocolStats {
        &self.stats
    }

    /// Runs the event loop until the event source is exhausted. The network layer is granted
    ///  credit for a full window before the first event is processed.
    pub async fn run(&mut self, events: &mut dyn EventSource) {
        info!("starting protocol engine");
        self.network_layer.enable_network_layer(NR_BUFS);

        while let Some(event) = events.wait_for_event().await {
            self.on_event(event).await;
        }

        info!("event source closed - terminating protocol engine after sending {} frames ({} retransmissions): {:?}",
            self.stats.frames_sent(), self.stats.retransmissions(), self.stats);
    }

    pub async fn on_event(&mut self, event: ProtocolEvent) {
        trace!("event: {:?}", event);

        match event {
            ProtocolEvent::NetworkLayerReady(packet) => self.on_network_layer_ready(packet).await,
            ProtocolEvent::FrameArrival(frame) => self.on_frame_arrival(frame).await,
            ProtocolEvent::ChecksumError => self.on_checksum_error().await,
            ProtocolEvent::Timeout { seq, timer } => self.on_timeout(seq, timer).await,
            ProtocolEvent::AckTimeout { timer } => self.on_ack_timeout(timer).await,
            ProtocolEvent::Unrecognized(code) => {
                warn!("undefined event type {} - ignoring", code);
                self.stats.unrecognized_events += 1;
            }
        }

        self.debug_assert_invariants();
    }

    async fn on_network_layer_ready(&mut self, packet: Packet) {
        let seq = self.sender.push(packet);
        self.send_frame(FrameKind::Data, seq).await;
    }

    async fn on_frame_arrival(&mut self, frame: Frame) {
        if frame.kind == FrameKind::Data {
            self.on_data_frame(frame.seq, frame.info).await;
        }

        if frame.kind == FrameKind::Nak {
            let requested = frame.ack.increment();
            if self.sender.is_outstanding(requested) {
                debug!("peer requested {} - retransmitting", requested);
                self.stats.nak_retransmissions += 1;
                self.send_frame(FrameKind::Data, requested).await;
            }
        }

        // every frame carries a cumulative acknowledgement
        while let Some(acknowledged) = self.sender.pop_acknowledged(frame.ack) {
            trace!("{} acknowledged", acknowledged);
            self.timers.stop_timer(acknowledged);
            self.network_layer.enable_network_layer(1);
        }
    }

    async fn on_data_frame(&mut self, seq: SeqNr, info: Packet) {
        if seq != self.receiver.frame_expected() && self.no_nak {
            debug!("received {} while expecting {} - sending NAK", seq, self.receiver.frame_expected());
            self.send_frame(FrameKind::Nak, SeqNr::ZERO).await;
        }
        else {
            self.timers.start_ack_timer();
        }

        if !self.receiver.store(seq, info) {
            trace!("{} is outside the receive window or a duplicate - discarding", seq);
        }

        // NB: this runs for discarded frames as well. A packet that is held back because the
        //  network layer was not ready stays unacknowledged, so the peer's retransmission of it
        //  ends up here and retries the delivery.
        self.deliver_in_sequence();
    }

    /// Hands buffered packets to the network layer in sequence for as long as the network layer
    ///  is ready for them. Packets that are not delivered stay in the receive window, and are not
    ///  acknowledged.
    fn deliver_in_sequence(&mut self) {
        while self.receiver.is_buffered(self.receiver.frame_expected()) {
            if !self.network_layer.is_ready_for_delivery() {
                debug!("network layer is not ready - keeping {} buffered", self.receiver.frame_expected());
                self.stats.deferred_deliveries += 1;
                break;
            }

            match self.receiver.pop_in_sequence() {
                Some(packet) => {
                    self.network_layer.to_network_layer(packet);
                    self.stats.packets_delivered += 1;
                    self.no_nak = true;
                    self.timers.start_ack_timer();
                }
                None => break,
            }
        }
    }

    async fn on_checksum_error(&mut self) {
        self.stats.checksum_errors += 1;
        if self.no_nak {
            debug!("damaged frame - sending NAK for {}", self.receiver.frame_expected());
            self.send_frame(FrameKind::Nak, SeqNr::ZERO).await;
        }
    }

    async fn on_timeout(&mut self, seq: SeqNr, timer: TimerId) {
        if !self.timers.take_expired_timer(seq, timer) || !self.sender.is_outstanding(seq) {
            debug!("discarding stale retransmission timer for {}", seq);
            self.stats.stale_timer_events += 1;
            return;
        }

        debug!("retransmission timer expired for {}", seq);
        self.stats.timeout_retransmissions += 1;
        self.send_frame(FrameKind::Data, seq).await;
    }

    async fn on_ack_timeout(&mut self, timer: TimerId) {
        if !self.timers.take_expired_ack_timer(timer) {
            debug!("discarding stale ACK timer");
            self.stats.stale_timer_events += 1;
            return;
        }
        self.send_frame(FrameKind::Ack, SeqNr::ZERO).await;
    }

    /// `frame_nr` is only meaningful for DATA frames. Every frame piggy-backs the cumulative
    ///  acknowledgement for everything received so far, so sending any frame makes a pending
    ///  separate ACK unnecessary.
    async fn send_frame(&mut self, kind: FrameKind, frame_nr: SeqNr) {
        let ack = self.receiver.piggyback_ack();
        let frame = match kind {
            FrameKind::Data => Frame::data(frame_nr, ack, self.sender.packet(frame_nr).clone()),
            FrameKind::Ack => Frame::ack(ack),
            FrameKind::Nak => {
                self.no_nak = false;
                Frame::nak(ack)
            }
        };

        trace!("sending {:?}", frame);
        self.physical_layer.to_physical_layer(&frame).await;
        self.stats.record_sent(kind);

        if kind == FrameKind::Data {
            self.timers.start_timer(frame_nr);
        }
        self.timers.stop_ack_timer();
    }

    fn debug_assert_invariants(&self) {
        debug_assert!(self.sender.num_outstanding() <= NR_BUFS);
        debug_assert_eq!(self.receiver.frame_expected().distance_to(self.receiver.too_far()), NR_BUFS);
    }
}
