use crate::frame::Packet;
use crate::sequence_number::{between, SeqNr, NR_BUFS};

/// The sender's side of the sliding window: `[ack_expected, next_frame_to_send)` are the frames
///  that were sent but not yet acknowledged. Their packets are kept for retransmission.
pub struct SenderWindow {
    /// lower edge: the oldest unacknowledged frame
    ack_expected: SeqNr,
    /// upper edge (exclusive): the sequence number for the next new frame
    next_frame_to_send: SeqNr,
    out_buf: [Packet; NR_BUFS],
}

impl Default for SenderWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderWindow {
    pub fn new() -> SenderWindow {
        SenderWindow {
            ack_expected: SeqNr::ZERO,
            next_frame_to_send: SeqNr::ZERO,
            out_buf: std::array::from_fn(|_| Packet::empty()),
        }
    }

    pub fn ack_expected(&self) -> SeqNr {
        self.ack_expected
    }

    pub fn next_frame_to_send(&self) -> SeqNr {
        self.next_frame_to_send
    }

    pub fn num_outstanding(&self) -> usize {
        self.ack_expected.distance_to(self.next_frame_to_send)
    }

    pub fn is_full(&self) -> bool {
        self.num_outstanding() >= NR_BUFS
    }

    /// true iff `seq` was sent and is not acknowledged yet
    pub fn is_outstanding(&self, seq: SeqNr) -> bool {
        between(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// Stores a new packet in the slot for the upper window edge and advances the upper edge,
    ///  returning the sequence number assigned to the packet.
    ///
    /// NB: Callers must only do this if the window has room, i.e. if credit was granted for it
    pub fn push(&mut self, packet: Packet) -> SeqNr {
        debug_assert!(!self.is_full(), "sender window overflow");

        let seq = self.next_frame_to_send;
        self.out_buf[seq.slot()] = packet;
        self.next_frame_to_send = seq.increment();
        seq
    }

    /// the packet sent with sequence number `seq` - this is only meaningful for outstanding
    ///  sequence numbers
    pub fn packet(&self, seq: SeqNr) -> &Packet {
        &self.out_buf[seq.slot()]
    }

    /// Treats `ack` as a cumulative acknowledgement and advances the lower window edge by one
    ///  frame if that frame is covered by it, returning the sequence number of the frame that is
    ///  now acknowledged. Callers loop until this returns `None`.
    pub fn pop_acknowledged(&mut self, ack: SeqNr) -> Option<SeqNr> {
        if !between(self.ack_expected, ack, self.next_frame_to_send) {
            return None;
        }
        let acknowledged = self.ack_expected;
        self.ack_expected = acknowledged.increment();
        Some(acknowledged)
    }
}

/// The receiver's side of the sliding window: `[frame_expected, too_far)` are the sequence numbers
///  that are accepted, in any order, and buffered until they can be delivered in sequence.
pub struct ReceiverWindow {
    /// lower edge: the next frame to be delivered to the network layer
    frame_expected: SeqNr,
    /// upper edge (exclusive)
    too_far: SeqNr,
    /// `Some` for slots with a frame that was received but not delivered yet
    in_buf: [Option<Packet>; NR_BUFS],
}

impl Default for ReceiverWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverWindow {
    pub fn new() -> ReceiverWindow {
        ReceiverWindow {
            frame_expected: SeqNr::ZERO,
            too_far: SeqNr::from_raw(NR_BUFS as u8),
            in_buf: std::array::from_fn(|_| None),
        }
    }

    pub fn frame_expected(&self) -> SeqNr {
        self.frame_expected
    }

    pub fn too_far(&self) -> SeqNr {
        self.too_far
    }

    /// the value for the `ack` field of outgoing frames: everything before `frame_expected`
    ///  was received
    pub fn piggyback_ack(&self) -> SeqNr {
        self.frame_expected.decrement()
    }

    pub fn is_buffered(&self, seq: SeqNr) -> bool {
        self.in_buf[seq.slot()].is_some()
    }

    pub fn num_buffered(&self) -> usize {
        self.in_buf.iter().filter(|p| p.is_some()).count()
    }

    /// Buffers the packet of a DATA frame if its sequence number is inside the window and was not
    ///  received before. Returns `false` (and drops the packet) otherwise.
    pub fn store(&mut self, seq: SeqNr, packet: Packet) -> bool {
        if !between(self.frame_expected, seq, self.too_far) {
            return false;
        }
        let slot = &mut self.in_buf[seq.slot()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(packet);
        true
    }

    /// Takes the packet for `frame_expected` if it was received, advancing the window by one
    ///  frame. Calling this until it returns `None` delivers the contiguous run of received frames.
    pub fn pop_in_sequence(&mut self) -> Option<Packet> {
        let packet = self.in_buf[self.frame_expected.slot()].take()?;
        self.frame_expected = self.frame_expected.increment();
        self.too_far = self.too_far.increment();
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn seq(n: u8) -> SeqNr {
        SeqNr::from_raw(n)
    }

    #[test]
    fn test_sender_push_and_acknowledge() {
        let mut window = SenderWindow::new();
        for i in 0..NR_BUFS {
            assert!(!window.is_full());
            let assigned = window.push(Packet::from(format!("p{}", i)));
            assert_eq!(assigned, seq(i as u8));
        }
        assert!(window.is_full());
        assert_eq!(window.num_outstanding(), NR_BUFS);
        assert_eq!(window.packet(seq(2)), &Packet::from("p2"));

        // cumulative ack for 0..=1
        assert_eq!(window.pop_acknowledged(seq(1)), Some(seq(0)));
        assert_eq!(window.pop_acknowledged(seq(1)), Some(seq(1)));
        assert_eq!(window.pop_acknowledged(seq(1)), None);
        assert_eq!(window.ack_expected(), seq(2));
        assert_eq!(window.num_outstanding(), 2);
        assert!(!window.is_outstanding(seq(1)));
        assert!(window.is_outstanding(seq(2)));
        assert!(window.is_outstanding(seq(3)));
        assert!(!window.is_outstanding(seq(4)));
    }

    #[rstest]
    #[case::nothing_sent(0, 0, 7, 0)]
    #[case::old_ack(2, 4, 1, 0)]
    #[case::ack_at_upper_edge(2, 4, 4, 0)]
    #[case::partial(2, 4, 2, 1)]
    #[case::all(2, 4, 3, 2)]
    #[case::wrapped(6, 2, 0, 3)]
    fn test_sender_pop_acknowledged(#[case] ack_expected: u8, #[case] next: u8, #[case] ack: u8, #[case] expected_num_popped: usize) {
        let mut window = SenderWindow::new();
        window.ack_expected = seq(ack_expected);
        window.next_frame_to_send = seq(next);

        let mut num_popped = 0;
        while let Some(popped) = window.pop_acknowledged(seq(ack)) {
            assert_eq!(popped, seq(ack_expected + num_popped as u8));
            num_popped += 1;
        }
        assert_eq!(num_popped, expected_num_popped);
    }

    #[test]
    fn test_sender_slots_are_reused_after_wrap_around() {
        let mut window = SenderWindow::new();
        for round in 0..3u8 {
            for _ in 0..NR_BUFS {
                let seq = window.push(Packet::from(vec![round]));
                assert_eq!(window.pop_acknowledged(seq), Some(seq));
            }
        }
        assert_eq!(window.ack_expected(), seq((3 * NR_BUFS) as u8));
        assert_eq!(window.num_outstanding(), 0);
    }

    #[test]
    fn test_receiver_in_order() {
        let mut window = ReceiverWindow::new();
        assert_eq!(window.piggyback_ack(), seq(7));

        assert!(window.store(seq(0), "a".into()));
        assert_eq!(window.pop_in_sequence(), Some(Packet::from("a")));
        assert_eq!(window.pop_in_sequence(), None);
        assert_eq!(window.frame_expected(), seq(1));
        assert_eq!(window.too_far(), seq(5));
        assert_eq!(window.piggyback_ack(), seq(0));
    }

    #[test]
    fn test_receiver_out_of_order() {
        let mut window = ReceiverWindow::new();
        assert!(window.store(seq(2), "c".into()));
        assert!(window.store(seq(1), "b".into()));
        assert_eq!(window.pop_in_sequence(), None);
        assert_eq!(window.num_buffered(), 2);

        assert!(window.store(seq(0), "a".into()));
        assert_eq!(window.pop_in_sequence(), Some(Packet::from("a")));
        assert_eq!(window.pop_in_sequence(), Some(Packet::from("b")));
        assert_eq!(window.pop_in_sequence(), Some(Packet::from("c")));
        assert_eq!(window.pop_in_sequence(), None);
        assert_eq!(window.frame_expected(), seq(3));
        assert_eq!(window.num_buffered(), 0);
    }

    #[rstest]
    #[case::below_window(7)]
    #[case::at_upper_edge(4)]
    #[case::far_above(6)]
    fn test_receiver_rejects_outside_window(#[case] n: u8) {
        let mut window = ReceiverWindow::new();
        assert!(!window.store(seq(n), "x".into()));
        assert_eq!(window.num_buffered(), 0);
    }

    #[test]
    fn test_receiver_rejects_duplicate() {
        let mut window = ReceiverWindow::new();
        assert!(window.store(seq(3), "first".into()));
        assert!(!window.store(seq(3), "second".into()));
        assert!(window.is_buffered(seq(3)));

        for n in 0..3 {
            assert!(window.store(seq(n), "x".into()));
        }
        for _ in 0..3 {
            window.pop_in_sequence();
        }
        assert_eq!(window.pop_in_sequence(), Some(Packet::from("first")));
    }

    #[test]
    fn test_receiver_window_size_is_invariant() {
        let mut window = ReceiverWindow::new();
        for n in 0..20u8 {
            assert!(window.store(SeqNr::from_raw(n % SeqNr::MODULUS), Packet::empty()));
            assert!(window.pop_in_sequence().is_some());
            assert_eq!(window.frame_expected().distance_to(window.too_far()), NR_BUFS);
        }
    }
}
