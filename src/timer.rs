use std::time::Duration;
#[cfg(test)] use mockall::automock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;
use crate::config::SwpConfig;
use crate::event::{ProtocolEvent, TimerId};
use crate::sequence_number::{SeqNr, NR_BUFS};

/// The timers the protocol engine needs: one retransmission timer per buffer slot, and a single
///  ACK timer. Timers are one-shot, and starting a timer that is already running replaces it.
///
/// Timers never touch protocol state. Expiry is reported as a [ProtocolEvent] through the event
///  loop, and the engine calls back into the timers to check that the firing is not stale.
#[cfg_attr(test, automock)]
pub trait ProtocolTimers: Send + 'static {
    fn start_timer(&mut self, seq: SeqNr);
    fn stop_timer(&mut self, seq: SeqNr);

    fn start_ack_timer(&mut self);
    fn stop_ack_timer(&mut self);

    /// Returns `true` iff `timer` is the retransmission timer currently armed for `seq`, marking
    ///  it as expired. Returns `false` for firings of timers that were stopped or re-armed in
    ///  the meantime.
    fn take_expired_timer(&mut self, seq: SeqNr, timer: TimerId) -> bool;

    /// same as [ProtocolTimers::take_expired_timer] for the ACK timer
    fn take_expired_ack_timer(&mut self, timer: TimerId) -> bool;
}

struct ArmedTimer {
    id: TimerId,
    seq: SeqNr,
    handle: JoinHandle<()>,
}

impl Drop for ArmedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// [ProtocolTimers] based on tokio tasks: each armed timer is a task that sleeps and then sends
///  its event into the event loop's timer queue.
pub struct TokioTimers {
    retransmission_timeout: Duration,
    ack_timeout: Duration,
    events: mpsc::UnboundedSender<ProtocolEvent>,
    next_id: u64,
    frame_timers: [Option<ArmedTimer>; NR_BUFS],
    ack_timer: Option<ArmedTimer>,
}

impl TokioTimers {
    pub fn new(config: &SwpConfig, events: mpsc::UnboundedSender<ProtocolEvent>) -> TokioTimers {
        TokioTimers {
            retransmission_timeout: config.retransmission_timeout,
            ack_timeout: config.ack_timeout,
            events,
            next_id: 0,
            frame_timers: std::array::from_fn(|_| None),
            ack_timer: None,
        }
    }

    fn arm(&mut self, seq: SeqNr, delay: Duration, create_event: fn(SeqNr, TimerId) -> ProtocolEvent) -> ArmedTimer {
        let id = TimerId::from_raw(self.next_id);
        self.next_id += 1;

        let deadline = Instant::now() + delay;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let event = create_event(seq, id);
            trace!("timer expired: {:?}", event);
            // the receiver is gone when the event loop terminated, and then there is no one left
            //  to care about the timer
            let _ = events.send(event);
        });

        ArmedTimer { id, seq, handle }
    }
}

impl ProtocolTimers for TokioTimers {
    fn start_timer(&mut self, seq: SeqNr) {
        // NB: assigning drops a previously armed timer for the same slot, which aborts it
        let armed = self.arm(seq, self.retransmission_timeout, |seq, timer| ProtocolEvent::Timeout { seq, timer });
        self.frame_timers[seq.slot()] = Some(armed);
    }

    fn stop_timer(&mut self, seq: SeqNr) {
        self.frame_timers[seq.slot()] = None;
    }

    fn start_ack_timer(&mut self) {
        let armed = self.arm(SeqNr::ZERO, self.ack_timeout, |_, timer| ProtocolEvent::AckTimeout { timer });
        self.ack_timer = Some(armed);
    }

    fn stop_ack_timer(&mut self) {
        self.ack_timer = None;
    }

    fn take_expired_timer(&mut self, seq: SeqNr, timer: TimerId) -> bool {
        let slot = &mut self.frame_timers[seq.slot()];
        let is_current = matches!(slot.as_ref(), Some(armed) if armed.id == timer && armed.seq == seq);
        if is_current {
            *slot = None;
        }
        is_current
    }

    fn take_expired_ack_timer(&mut self, timer: TimerId) -> bool {
        let is_current = matches!(self.ack_timer.as_ref(), Some(armed) if armed.id == timer);
        if is_current {
            self.ack_timer = None;
        }
        is_current
    }
}
