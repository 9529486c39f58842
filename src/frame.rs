use std::fmt::{Debug, Formatter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_32_ISO_HDLC};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::debug;
use crate::sequence_number::SeqNr;

const FRAME_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// An opaque chunk of data handed down by the network layer, and delivered to the peer's
///  network layer unchanged.
#[derive(Clone, Eq, PartialEq, Default)]
pub struct Packet(Bytes);

impl Debug for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.0.as_ref()),
        }
    }
}

impl Packet {
    pub fn empty() -> Packet {
        Packet(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for Packet {
    fn from(value: &'static str) -> Self {
        Packet(Bytes::from_static(value.as_bytes()))
    }
}

impl From<Vec<u8>> for Packet {
    fn from(value: Vec<u8>) -> Self {
        Packet(value.into())
    }
}

impl From<String> for Packet {
    fn from(value: String) -> Self {
        Packet(value.into())
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum FrameKind {
    Data = 0,
    Ack = 1,
    /// requests retransmission of the frame *after* the frame's `ack`
    Nak = 2,
}

/// A frame as it travels on the physical layer.
///
/// Every frame carries a cumulative acknowledgement: `ack` means that all frames up to and
///  including `ack` were received. `seq` and `info` are meaningful for DATA frames only.
#[derive(Clone, Eq, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub seq: SeqNr,
    pub ack: SeqNr,
    pub info: Packet,
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FrameKind::Data => write!(f, "DATA{{seq:{},ack:{},info:{:?}}}", self.seq, self.ack, self.info),
            FrameKind::Ack => write!(f, "ACK{{ack:{}}}", self.ack),
            FrameKind::Nak => write!(f, "NAK{{ack:{}}}", self.ack),
        }
    }
}

/// The result of decoding raw bytes received from the physical layer
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DecodedFrame {
    Intact(Frame),
    /// truncated, checksum mismatch or sequence numbers outside the sequence number space
    Damaged,
    /// the checksum is valid, but the frame kind is not part of this protocol
    UnknownKind(u8),
}

/// Wire format, all numbers in network byte order:
///
/// ```ascii
/// 0: checksum (u32) - CRC-32 over everything after the checksum field
/// 4: kind (u8): 0 = DATA, 1 = ACK, 2 = NAK
/// 5: seq (u8)
/// 6: ack (u8)
/// 7: payload (the rest of the frame, empty for ACK and NAK)
/// ```
impl Frame {
    pub const HEADER_LEN: usize = size_of::<u32>() + 3 * size_of::<u8>();

    pub fn data(seq: SeqNr, ack: SeqNr, info: Packet) -> Frame {
        Frame { kind: FrameKind::Data, seq, ack, info }
    }

    pub fn ack(ack: SeqNr) -> Frame {
        Frame { kind: FrameKind::Ack, seq: SeqNr::ZERO, ack, info: Packet::empty() }
    }

    pub fn nak(ack: SeqNr) -> Frame {
        Frame { kind: FrameKind::Nak, seq: SeqNr::ZERO, ack, info: Packet::empty() }
    }

    pub fn serialized_len(&self) -> usize {
        Self::HEADER_LEN + self.info.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u32(0); // placeholder for the checksum
        buf.put_u8(self.kind.into());
        buf.put_u8(self.seq.to_raw());
        buf.put_u8(self.ack.to_raw());
        buf.put_slice(self.info.as_bytes());

        let checksum = FRAME_CRC.checksum(&buf[start + size_of::<u32>()..]);
        buf[start..start + size_of::<u32>()].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_len());
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn deser(raw: &[u8]) -> DecodedFrame {
        if raw.len() < Self::HEADER_LEN {
            debug!("received frame of length {} which is shorter than a frame header - damaged", raw.len());
            return DecodedFrame::Damaged;
        }

        let mut buf = raw;
        let checksum = buf.get_u32();
        if checksum != FRAME_CRC.checksum(buf) {
            debug!("received frame with checksum mismatch - damaged");
            return DecodedFrame::Damaged;
        }

        let raw_kind = buf.get_u8();
        let kind = match FrameKind::try_from(raw_kind) {
            Ok(kind) => kind,
            Err(_) => return DecodedFrame::UnknownKind(raw_kind),
        };

        let (raw_seq, raw_ack) = (buf.get_u8(), buf.get_u8());
        let (seq, ack) = match (SeqNr::try_from_raw(raw_seq), SeqNr::try_from_raw(raw_ack)) {
            (Some(seq), Some(ack)) => (seq, ack),
            _ => {
                debug!("received frame with sequence numbers seq={} ack={} out of range - damaged", raw_seq, raw_ack);
                return DecodedFrame::Damaged;
            }
        };

        let info = match kind {
            FrameKind::Data => Packet(Bytes::copy_from_slice(buf)),
            FrameKind::Ack | FrameKind::Nak => Packet::empty(),
        };

        DecodedFrame::Intact(Frame { kind, seq, ack, info })
    }
}
