use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use crate::event::TimerId;
use crate::frame::{Frame, Packet};
use crate::network_layer::NetworkLayer;
use crate::physical_layer::PhysicalLayer;
use crate::sequence_number::SeqNr;
use crate::timer::ProtocolTimers;

/// [PhysicalLayer] that records sent frames for later verification. Clones share the record.
#[derive(Clone, Default)]
pub struct TrackingPhysicalLayer {
    sent: Arc<Mutex<Vec<Frame>>>,
}

impl TrackingPhysicalLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// removes and returns all frames sent so far
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn assert_sent(&self, expected: &[Frame]) {
        assert_eq!(self.take_sent(), expected);
    }

    pub fn assert_nothing_sent(&self) {
        self.assert_sent(&[]);
    }
}

#[async_trait]
impl PhysicalLayer for TrackingPhysicalLayer {
    async fn to_physical_layer(&self, frame: &Frame) {
        self.sent.lock().unwrap().push(frame.clone());
    }
}

struct NetworkLayerRecord {
    credit: usize,
    delivered: Vec<Packet>,
    ready: bool,
}

impl Default for NetworkLayerRecord {
    fn default() -> Self {
        NetworkLayerRecord {
            credit: 0,
            delivered: Vec::new(),
            ready: true,
        }
    }
}

/// [NetworkLayer] that sums up granted credit and records delivered packets. It is ready for
///  delivery unless told otherwise by [TrackingNetworkLayer::set_ready]. Clones share the record.
#[derive(Clone, Default)]
pub struct TrackingNetworkLayer {
    record: Arc<Mutex<NetworkLayerRecord>>,
}

impl TrackingNetworkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// returns the credit granted since the last call
    pub fn take_credit(&self) -> usize {
        std::mem::take(&mut self.record.lock().unwrap().credit)
    }

    /// removes and returns all packets delivered so far
    pub fn take_delivered(&self) -> Vec<Packet> {
        std::mem::take(&mut self.record.lock().unwrap().delivered)
    }

    pub fn set_ready(&self, ready: bool) {
        self.record.lock().unwrap().ready = ready;
    }
}

impl NetworkLayer for TrackingNetworkLayer {
    fn enable_network_layer(&self, n: usize) {
        self.record.lock().unwrap().credit += n;
    }

    fn is_ready_for_delivery(&self) -> bool {
        self.record.lock().unwrap().ready
    }

    fn to_network_layer(&self, packet: Packet) {
        let mut record = self.record.lock().unwrap();
        assert!(record.ready, "packet delivered to a network layer that is not ready");
        record.delivered.push(packet);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TimerCall {
    Start(SeqNr),
    Stop(SeqNr),
    StartAck,
    StopAck,
}

#[derive(Default)]
struct TimersRecord {
    calls: Vec<TimerCall>,
    next_id: u64,
    frame_timers: [Option<(SeqNr, TimerId)>; crate::sequence_number::NR_BUFS],
    ack_timer: Option<TimerId>,
}

impl TimersRecord {
    fn next_id(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId::from_raw(self.next_id)
    }
}

/// [ProtocolTimers] that never fire on their own, but record calls and keep track of which timers
///  are currently armed. Tests fire timers explicitly by feeding the engine a TIMEOUT or
///  ACK_TIMEOUT event with the id returned by [TrackingTimers::armed_timer] or
///  [TrackingTimers::armed_ack_timer]. Clones share the record.
#[derive(Clone, Default)]
pub struct TrackingTimers {
    record: Arc<Mutex<TimersRecord>>,
}

impl TrackingTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// removes and returns all calls made so far
    pub fn take_calls(&self) -> Vec<TimerCall> {
        std::mem::take(&mut self.record.lock().unwrap().calls)
    }

    pub fn armed_timer(&self, seq: SeqNr) -> Option<TimerId> {
        match self.record.lock().unwrap().frame_timers[seq.slot()] {
            Some((armed_seq, id)) if armed_seq == seq => Some(id),
            _ => None,
        }
    }

    pub fn armed_ack_timer(&self) -> Option<TimerId> {
        self.record.lock().unwrap().ack_timer
    }
}

impl ProtocolTimers for TrackingTimers {
    fn start_timer(&mut self, seq: SeqNr) {
        let mut record = self.record.lock().unwrap();
        record.calls.push(TimerCall::Start(seq));
        let id = record.next_id();
        record.frame_timers[seq.slot()] = Some((seq, id));
    }

    fn stop_timer(&mut self, seq: SeqNr) {
        let mut record = self.record.lock().unwrap();
        record.calls.push(TimerCall::Stop(seq));
        record.frame_timers[seq.slot()] = None;
    }

    fn start_ack_timer(&mut self) {
        let mut record = self.record.lock().unwrap();
        record.calls.push(TimerCall::StartAck);
        record.ack_timer = Some(record.next_id());
    }

    fn stop_ack_timer(&mut self) {
        let mut record = self.record.lock().unwrap();
        record.calls.push(TimerCall::StopAck);
        record.ack_timer = None;
    }

    fn take_expired_timer(&mut self, seq: SeqNr, timer: TimerId) -> bool {
        let mut record = self.record.lock().unwrap();
        let slot = &mut record.frame_timers[seq.slot()];
        let is_current = *slot == Some((seq, timer));
        if is_current {
            *slot = None;
        }
        is_current
    }

    fn take_expired_ack_timer(&mut self, timer: TimerId) -> bool {
        let mut record = self.record.lock().unwrap();
        let is_current = record.ack_timer == Some(timer);
        if is_current {
            record.ack_timer = None;
        }
        is_current
    }
}
