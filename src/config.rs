use std::time::Duration;
use anyhow::bail;
use crate::frame::Frame;

#[derive(Debug, Clone)]
pub struct SwpConfig {
    /// Time after which an unacknowledged DATA frame is sent again. This should be comfortably
    ///  above the round trip time plus [SwpConfig::ack_timeout], otherwise frames are
    ///  retransmitted while their acknowledgement is still on its way.
    pub retransmission_timeout: Duration,

    /// Time a receiver waits for outgoing data to piggy-back an acknowledgement on before it
    ///  sends a separate ACK frame. Must be shorter than the retransmission timeout.
    pub ack_timeout: Duration,

    /// This is the maximum payload per frame. A frame needs to fit into a single datagram on
    ///  the physical layer, so for UDP with full Ethernet frames and no optional IP headers this
    ///  is `1472 - Frame::HEADER_LEN` for IPV4.
    pub max_payload_len: usize,

    /// capacity of the queue for raw frames received from the physical layer
    pub frame_queue_len: usize,
    /// capacity of the queue for packets submitted by the network layer, waiting for credit
    pub packet_queue_len: usize,
    /// capacity of the queue for packets delivered to the network layer
    pub delivery_queue_len: usize,
}

impl Default for SwpConfig {
    fn default() -> Self {
        SwpConfig {
            retransmission_timeout: Duration::from_millis(200),
            ack_timeout: Duration::from_millis(100),
            max_payload_len: 1472 - Frame::HEADER_LEN,
            frame_queue_len: 64,
            packet_queue_len: 16,
            delivery_queue_len: 64,
        }
    }
}

impl SwpConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ack_timeout.is_zero() {
            bail!("ACK timeout must not be zero");
        }
        if self.ack_timeout >= self.retransmission_timeout {
            bail!("ACK timeout {:?} must be shorter than the retransmission timeout {:?}", self.ack_timeout, self.retransmission_timeout);
        }
        if self.max_payload_len == 0 {
            bail!("maximum payload length must not be zero");
        }
        if self.frame_queue_len == 0 || self.packet_queue_len == 0 || self.delivery_queue_len == 0 {
            bail!("queue capacities must not be zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        SwpConfig::default().validate().unwrap();
    }

    #[rstest]
    #[case::zero_ack_timeout(|c: &mut SwpConfig| c.ack_timeout = Duration::ZERO)]
    #[case::ack_timeout_equal(|c: &mut SwpConfig| c.ack_timeout = c.retransmission_timeout)]
    #[case::ack_timeout_longer(|c: &mut SwpConfig| c.ack_timeout = Duration::from_secs(1))]
    #[case::zero_payload(|c: &mut SwpConfig| c.max_payload_len = 0)]
    #[case::zero_frame_queue(|c: &mut SwpConfig| c.frame_queue_len = 0)]
    #[case::zero_packet_queue(|c: &mut SwpConfig| c.packet_queue_len = 0)]
    #[case::zero_delivery_queue(|c: &mut SwpConfig| c.delivery_queue_len = 0)]
    fn test_validate_rejects(#[case] modify: fn(&mut SwpConfig)) {
        let mut config = SwpConfig::default();
        modify(&mut config);
        assert!(config.validate().is_err());
    }
}
