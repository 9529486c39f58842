use std::fmt::{Debug, Display, Formatter};

/// The highest sequence number. Sequence numbers are counted modulo `MAX_SEQ + 1`.
pub const MAX_SEQ: u8 = 7;

/// The number of buffer slots on each side, which is also the maximum size of both the sender's
///  and the receiver's window.
pub const NR_BUFS: usize = (MAX_SEQ as usize + 1) / 2;

// NB: If the windows could cover more than half of the sequence number space, a retransmitted
//      old frame would be indistinguishable from a new one after wrap-around
const _: () = assert!(MAX_SEQ % 2 == 1);
const _: () = assert!(2 * NR_BUFS <= MAX_SEQ as usize + 1);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct SeqNr(u8);

impl Display for SeqNr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for SeqNr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl SeqNr {
    pub const ZERO: SeqNr = SeqNr(0);
    pub const MODULUS: u8 = MAX_SEQ + 1;

    /// wraps values above [MAX_SEQ] into the sequence number space
    pub const fn from_raw(value: u8) -> SeqNr {
        SeqNr(value % Self::MODULUS)
    }

    /// for decoding: values outside the sequence number space are rejected rather than wrapped
    pub fn try_from_raw(value: u8) -> Option<SeqNr> {
        (value <= MAX_SEQ).then_some(SeqNr(value))
    }

    pub fn to_raw(&self) -> u8 {
        self.0
    }

    pub fn increment(&self) -> SeqNr {
        SeqNr((self.0 + 1) % Self::MODULUS)
    }

    pub fn decrement(&self) -> SeqNr {
        SeqNr((self.0 + MAX_SEQ) % Self::MODULUS)
    }

    /// the buffer (and timer) slot that belongs to this sequence number
    pub fn slot(&self) -> usize {
        self.0 as usize % NR_BUFS
    }

    /// number of increments it takes to get from `self` to `to`
    pub fn distance_to(&self, to: SeqNr) -> usize {
        ((to.0 + Self::MODULUS - self.0) % Self::MODULUS) as usize
    }

    pub fn all() -> impl Iterator<Item = SeqNr> {
        (0..=MAX_SEQ).map(SeqNr)
    }
}

/// Circular membership test: `n` lies in `[lower, upper_exclusive)` when the sequence number
///  space wraps around after [MAX_SEQ].
///
/// NB: `lower == upper_exclusive` is the empty interval, never the full circle
pub fn between(lower: SeqNr, n: SeqNr, upper_exclusive: SeqNr) -> bool {
    let (x, y, z) = (lower.0, n.0, upper_exclusive.0);
    ((x <= y) && (y < z)) || ((z < x) && (x <= y)) || ((y < z) && (z < x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::no_wrap(1, 2, 3, true)]
    #[case::lower_edge(1, 1, 3, true)]
    #[case::upper_edge(1, 3, 3, false)]
    #[case::below(1, 0, 3, false)]
    #[case::above(1, 5, 3, false)]
    #[case::wrap_before_zero(6, 7, 2, true)]
    #[case::wrap_zero(6, 0, 2, true)]
    #[case::wrap_after_zero(6, 1, 2, true)]
    #[case::wrap_upper_edge(6, 2, 2, false)]
    #[case::wrap_outside(6, 4, 2, false)]
    #[case::wrap_lower_edge(6, 6, 2, true)]
    #[case::empty(3, 3, 3, false)]
    #[case::empty_other(3, 4, 3, false)]
    #[case::full_window(4, 7, 0, true)]
    fn test_between(#[case] lower: u8, #[case] n: u8, #[case] upper: u8, #[case] expected: bool) {
        assert_eq!(between(SeqNr::from_raw(lower), SeqNr::from_raw(n), SeqNr::from_raw(upper)), expected);
    }

    #[test]
    fn test_between_matches_circular_interval_exhaustively() {
        for x in SeqNr::all() {
            for y in SeqNr::all() {
                for z in SeqNr::all() {
                    let is_in_interval = x.distance_to(y) < x.distance_to(z);
                    assert_eq!(between(x, y, z), is_in_interval, "between({}, {}, {})", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_between_degenerate_interval_is_empty() {
        for x in SeqNr::all() {
            for y in SeqNr::all() {
                assert!(!between(x, y, x));
            }
        }
    }

    #[rstest]
    #[case(0, 1)]
    #[case(3, 4)]
    #[case(6, 7)]
    #[case(7, 0)]
    fn test_increment_decrement(#[case] n: u8, #[case] expected: u8) {
        assert_eq!(SeqNr::from_raw(n).increment(), SeqNr::from_raw(expected));
        assert_eq!(SeqNr::from_raw(expected).decrement(), SeqNr::from_raw(n));
    }

    #[test]
    fn test_increment_wraps_after_full_cycle() {
        let mut n = SeqNr::ZERO;
        for _ in 0..SeqNr::MODULUS {
            n = n.increment();
        }
        assert_eq!(n, SeqNr::ZERO);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(3, 3)]
    #[case(4, 0)]
    #[case(7, 3)]
    fn test_slot(#[case] n: u8, #[case] expected: usize) {
        assert_eq!(SeqNr::from_raw(n).slot(), expected);
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(0, 4, 4)]
    #[case(6, 2, 4)]
    #[case(2, 6, 4)]
    #[case(7, 6, 7)]
    fn test_distance_to(#[case] from: u8, #[case] to: u8, #[case] expected: usize) {
        assert_eq!(SeqNr::from_raw(from).distance_to(SeqNr::from_raw(to)), expected);
    }

    #[rstest]
    #[case(0, Some(0))]
    #[case(7, Some(7))]
    #[case(8, None)]
    #[case(255, None)]
    fn test_try_from_raw(#[case] raw: u8, #[case] expected: Option<u8>) {
        assert_eq!(SeqNr::try_from_raw(raw), expected.map(SeqNr::from_raw));
    }
}
