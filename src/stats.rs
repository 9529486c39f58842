use crate::frame::FrameKind;

/// Counters kept by the protocol engine, mostly useful for tests and diagnostics
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProtocolStats {
    pub data_frames_sent: u64,
    pub ack_frames_sent: u64,
    pub nak_frames_sent: u64,
    /// DATA frames sent again because their retransmission timer expired
    pub timeout_retransmissions: u64,
    /// DATA frames sent again because the peer requested them with a NAK
    pub nak_retransmissions: u64,
    pub packets_delivered: u64,
    /// times in-sequence packets stayed buffered because the network layer was not ready for them
    pub deferred_deliveries: u64,
    pub checksum_errors: u64,
    /// timer firings that were discarded because the timer was stopped or re-armed after the
    ///  firing was queued
    pub stale_timer_events: u64,
    pub unrecognized_events: u64,
}

impl ProtocolStats {
    pub fn record_sent(&mut self, kind: FrameKind) {
        match kind {
            FrameKind::Data => self.data_frames_sent += 1,
            FrameKind::Ack => self.ack_frames_sent += 1,
            FrameKind::Nak => self.nak_frames_sent += 1,
        }
    }

    /// frames of all kinds, including retransmissions
    pub fn frames_sent(&self) -> u64 {
        self.data_frames_sent + self.ack_frames_sent + self.nak_frames_sent
    }

    pub fn retransmissions(&self) -> u64 {
        self.timeout_retransmissions + self.nak_retransmissions
    }
}
