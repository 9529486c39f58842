use std::collections::VecDeque;
use std::time::Duration;
use anyhow::bail;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::trace;
use crate::frame::{DecodedFrame, Frame, FrameKind};
use crate::sequence_number::{SeqNr, NR_BUFS};
use crate::session::FrameLink;

/// Fault injection for each direction of an in-memory link. All probabilities are per frame.
///
/// Reordering is bounded the way the sliding window protocol requires it: a frame can be overtaken
///  by at most `max_overtake` frames sent after it, and never by a frame whose sequence number or
///  acknowledgement is [NR_BUFS] or more ahead of its own. This is the maximum frame lifetime of
///  the protocol expressed in sequence numbers: a frame that lingers on the link while its
///  sequence number is reused would be accepted as a new frame.
#[derive(Debug, Clone)]
pub struct LossyLinkConfig {
    pub loss_probability: f64,
    /// probability that a single bit of the frame is flipped
    pub corruption_probability: f64,
    pub duplication_probability: f64,
    /// probability that a frame is held back, allowing frames sent later to overtake it
    pub reorder_probability: f64,
    /// upper bound for the number of frames overtaking a held back frame
    pub max_overtake: usize,
    /// held back frames are released when no new frame was sent for this long
    pub release_after_idle: Duration,
    pub latency: Duration,
    pub seed: u64,
    pub queue_len: usize,
}

impl Default for LossyLinkConfig {
    fn default() -> Self {
        LossyLinkConfig {
            loss_probability: 0.0,
            corruption_probability: 0.0,
            duplication_probability: 0.0,
            reorder_probability: 0.0,
            max_overtake: NR_BUFS - 1,
            release_after_idle: Duration::from_millis(50),
            latency: Duration::from_millis(5),
            seed: 0,
            queue_len: 64,
        }
    }
}

impl LossyLinkConfig {
    /// a link without any faults
    pub fn reliable() -> LossyLinkConfig {
        LossyLinkConfig::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, p) in [
            ("loss", self.loss_probability),
            ("corruption", self.corruption_probability),
            ("duplication", self.duplication_probability),
            ("reorder", self.reorder_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{} probability {} is not in [0, 1]", name, p);
            }
        }
        if self.loss_probability >= 1.0 {
            bail!("a link that loses every frame can not deliver anything");
        }
        if self.reorder_probability > 0.0 && self.max_overtake == 0 {
            bail!("reordering requires frames to be overtaken by at least one frame");
        }
        if self.queue_len == 0 {
            bail!("queue length must not be zero");
        }
        Ok(())
    }
}

/// Creates an in-memory link between two endpoints. Each direction independently drops, corrupts,
///  duplicates and reorders frames as configured, with its own RNG derived from the configured
///  seed.
///
/// A direction closes (i.e. the receiving endpoint sees its inbound channel end) after the
///  sending endpoint dropped its outbound sender and all frames in transit were delivered.
pub fn lossy_link(config: &LossyLinkConfig) -> anyhow::Result<(FrameLink, FrameLink)> {
    config.validate()?;

    let (a_out, a_to_b) = mpsc::channel(config.queue_len);
    let (b_out, b_to_a) = mpsc::channel(config.queue_len);
    let (a_in_send, a_in) = mpsc::channel(config.queue_len);
    let (b_in_send, b_in) = mpsc::channel(config.queue_len);

    spawn_direction(a_to_b, b_in_send, config, config.seed);
    spawn_direction(b_to_a, a_in_send, config, config.seed.wrapping_add(1));

    Ok((
        FrameLink { outbound: a_out, inbound: a_in },
        FrameLink { outbound: b_out, inbound: b_in },
    ))
}

fn spawn_direction(from: mpsc::Receiver<Bytes>, to: mpsc::Sender<Bytes>, config: &LossyLinkConfig, seed: u64) {
    let (in_transit_send, in_transit_recv) = mpsc::unbounded_channel();
    tokio::spawn(inject_faults(from, in_transit_send, config.clone(), StdRng::seed_from_u64(seed)));
    tokio::spawn(deliver(in_transit_recv, to));
}

/// The header fields that determine which frames may overtake each other. `None` for raw data
///  that does not decode as a frame, which is unconstrained.
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    kind: FrameKind,
    seq: SeqNr,
    ack: SeqNr,
}

impl FrameHeader {
    fn decode(raw: &[u8]) -> Option<FrameHeader> {
        match Frame::deser(raw) {
            DecodedFrame::Intact(frame) => Some(FrameHeader { kind: frame.kind, seq: frame.seq, ack: frame.ack }),
            DecodedFrame::Damaged | DecodedFrame::UnknownKind(_) => None,
        }
    }
}

/// `true` iff a frame sent after `earlier` may arrive before it
fn may_overtake(later: Option<FrameHeader>, earlier: Option<FrameHeader>) -> bool {
    match (later, earlier) {
        (Some(later), Some(earlier)) => {
            if earlier.ack.distance_to(later.ack) >= NR_BUFS {
                return false;
            }
            if later.kind == FrameKind::Data && earlier.kind == FrameKind::Data {
                return earlier.seq.distance_to(later.seq) < NR_BUFS;
            }
            true
        }
        _ => true,
    }
}

struct HeldFrame {
    raw: Bytes,
    header: Option<FrameHeader>,
    /// number of frames that may still overtake this one
    remaining_overtakes: usize,
}

/// Frames held back for reordering. Held frames are released in the order they were sent, so
///  frames only ever overtake each other by being sent while older frames are held.
struct HoldBack {
    held: VecDeque<HeldFrame>,
}

impl HoldBack {
    fn new() -> HoldBack {
        HoldBack { held: VecDeque::new() }
    }

    fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Removes the held frames that `header` may not overtake, together with all frames held
    ///  before them.
    fn release_before(&mut self, header: Option<FrameHeader>) -> Vec<Bytes> {
        let num_released = self.held.iter()
            .rposition(|h| h.remaining_overtakes == 0 || !may_overtake(header, h.header))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.held.drain(..num_released)
            .map(|h| h.raw)
            .collect()
    }

    fn hold(&mut self, raw: Bytes, header: Option<FrameHeader>, max_overtake: usize) {
        self.held.push_back(HeldFrame { raw, header, remaining_overtakes: max_overtake });
    }

    /// all held frames are overtaken by one frame
    fn overtaken(&mut self) {
        for h in self.held.iter_mut() {
            h.remaining_overtakes -= 1;
        }
    }

    fn release_all(&mut self) -> Vec<Bytes> {
        self.held.drain(..)
            .map(|h| h.raw)
            .collect()
    }
}

async fn inject_faults(mut from: mpsc::Receiver<Bytes>, in_transit: mpsc::UnboundedSender<(Instant, Bytes)>, config: LossyLinkConfig, mut rng: StdRng) {
    let mut hold_back = HoldBack::new();
    let send = |frames: Vec<Bytes>| {
        let deliver_at = Instant::now() + config.latency;
        for frame in frames {
            // the delivering task ends only when the receiving endpoint is gone
            let _ = in_transit.send((deliver_at, frame));
        }
    };

    loop {
        let frame = if hold_back.is_empty() {
            from.recv().await
        }
        else {
            select! {
                frame = from.recv() => frame,
                _ = sleep(config.release_after_idle) => {
                    trace!("lossy link: releasing held frames after idle period");
                    send(hold_back.release_all());
                    continue;
                }
            }
        };

        let frame = match frame {
            Some(frame) => frame,
            None => break,
        };

        if rng.gen_bool(config.loss_probability) {
            trace!("lossy link: dropping frame");
            continue;
        }

        let num_copies = if rng.gen_bool(config.duplication_probability) { 2 } else { 1 };
        for _ in 0..num_copies {
            let frame = if rng.gen_bool(config.corruption_probability) {
                trace!("lossy link: corrupting frame");
                flip_random_bit(&frame, &mut rng)
            }
            else {
                frame.clone()
            };

            let header = FrameHeader::decode(&frame);
            send(hold_back.release_before(header));

            if rng.gen_bool(config.reorder_probability) {
                let max_overtake = rng.gen_range(1..=config.max_overtake);
                trace!("lossy link: holding back frame for up to {} frames", max_overtake);
                hold_back.hold(frame, header, max_overtake);
            }
            else {
                send(vec![frame]);
                hold_back.overtaken();
            }
        }
    }

    send(hold_back.release_all());
}

/// Delivers frames in the order they were put in transit, each after its latency elapsed
async fn deliver(mut in_transit: mpsc::UnboundedReceiver<(Instant, Bytes)>, to: mpsc::Sender<Bytes>) {
    while let Some((deliver_at, frame)) = in_transit.recv().await {
        sleep_until(deliver_at).await;
        if to.send(frame).await.is_err() {
            trace!("lossy link: receiving endpoint is gone");
            return;
        }
    }
}

fn flip_random_bit(frame: &Bytes, rng: &mut StdRng) -> Bytes {
    if frame.is_empty() {
        return frame.clone();
    }
    let mut buf = frame.to_vec();
    let bit = rng.gen_range(0..buf.len() * 8);
    buf[bit / 8] ^= 1 << (bit % 8);
    buf.into()
}
