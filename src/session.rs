use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{anyhow, bail};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use crate::config::SwpConfig;
use crate::event_source::ChannelEventSource;
use crate::frame::{Frame, Packet};
use crate::network_layer::{ChannelNetworkLayer, Credit};
use crate::physical_layer::{spawn_udp_receiver, ChannelPhysicalLayer, PhysicalLayer, UdpPhysicalLayer};
use crate::protocol::Protocol6;
use crate::timer::TokioTimers;

/// The two ends of a channel based physical layer, as seen from one endpoint: raw frames for the
///  peer go into `outbound`, raw frames from the peer arrive on `inbound`.
pub struct FrameLink {
    pub outbound: mpsc::Sender<Bytes>,
    pub inbound: mpsc::Receiver<Bytes>,
}

/// A protocol engine running in its own task, with an API for the host to exchange packets.
///
/// The engine terminates when its inbound frames are exhausted, or when the session is dropped.
pub struct Session {
    config: Arc<SwpConfig>,
    packets: mpsc::Sender<Packet>,
    delivered: mpsc::Receiver<Packet>,
    engine: JoinHandle<()>,
    udp_receiver: Option<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.engine.abort();
        if let Some(udp_receiver) = &self.udp_receiver {
            udp_receiver.abort();
        }
    }
}

impl Session {
    pub fn spawn(config: Arc<SwpConfig>, link: FrameLink) -> anyhow::Result<Session> {
        config.validate()?;

        let physical_layer = Arc::new(ChannelPhysicalLayer::new(link.outbound));
        Ok(Self::spawn_engine(config, physical_layer, link.inbound, None))
    }

    /// Runs the protocol on a UDP socket, exchanging frames with a single peer. Datagrams from
    ///  other addresses are ignored.
    pub fn spawn_udp(config: Arc<SwpConfig>, socket: UdpSocket, peer_addr: SocketAddr) -> anyhow::Result<Session> {
        config.validate()?;

        let socket = Arc::new(socket);
        info!("starting UDP session from {:?} to {:?}", socket.local_addr()?, peer_addr);

        let (frames_send, frames_recv) = mpsc::channel(config.frame_queue_len);
        let max_frame_len = Frame::HEADER_LEN + config.max_payload_len;
        let udp_receiver = spawn_udp_receiver(socket.clone(), peer_addr, max_frame_len, frames_send);

        let physical_layer = Arc::new(UdpPhysicalLayer::new(socket, peer_addr));
        Ok(Self::spawn_engine(config, physical_layer, frames_recv, Some(udp_receiver)))
    }

    fn spawn_engine(config: Arc<SwpConfig>, physical_layer: Arc<dyn PhysicalLayer>, frames: mpsc::Receiver<Bytes>, udp_receiver: Option<JoinHandle<()>>) -> Session {
        let (packets_send, packets_recv) = mpsc::channel(config.packet_queue_len);
        let (delivered_send, delivered_recv) = mpsc::channel(config.delivery_queue_len);
        let (timer_send, timer_recv) = mpsc::unbounded_channel();
        let credit = Credit::new();

        let network_layer = Arc::new(ChannelNetworkLayer::new(delivered_send, credit.clone()));
        let timers = Box::new(TokioTimers::new(&config, timer_send));
        let mut event_source = ChannelEventSource::new(frames, timer_recv, packets_recv, credit);

        let engine = tokio::spawn(async move {
            let mut protocol = Protocol6::new(physical_layer, network_layer, timers);
            protocol.run(&mut event_source).await;
        });

        Session {
            config,
            packets: packets_send,
            delivered: delivered_recv,
            engine,
            udp_receiver,
        }
    }

    /// Submits a packet for transmission, waiting while the host queue is full. Returning `Ok`
    ///  means that the engine accepted the packet, not that the peer received it.
    pub async fn send(&self, packet: impl Into<Packet>) -> anyhow::Result<()> {
        let packet = packet.into();
        if packet.len() > self.config.max_payload_len {
            bail!("packet of length {} exceeds the maximum payload length of {}", packet.len(), self.config.max_payload_len);
        }

        self.packets.send(packet).await
            .map_err(|_| anyhow!("protocol engine terminated"))
    }

    /// The next packet received from the peer, in the order the peer sent them. `None` after the
    ///  engine terminated and all packets it delivered were consumed.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.delivered.recv().await
    }

    pub fn is_terminated(&self) -> bool {
        self.engine.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::lossy_link::{lossy_link, LossyLinkConfig};
    use rstest::rstest;
    use std::time::Duration;
    use tokio::time::timeout;

    fn packet(n: usize) -> Packet {
        Packet::from(format!("packet-{}", n))
    }

    fn new_pair(link_config: &LossyLinkConfig) -> (Session, Session) {
        let (a, b) = lossy_link(link_config).unwrap();
        let config = Arc::new(SwpConfig::default());
        (Session::spawn(config.clone(), a).unwrap(), Session::spawn(config, b).unwrap())
    }

    async fn transfer(from: &Session, to: &mut Session, n: usize) -> Vec<Packet> {
        let send_all = async {
            for i in 0..n {
                from.send(packet(i)).await.unwrap();
            }
        };
        let receive_all = async {
            let mut received = Vec::new();
            for _ in 0..n {
                received.push(to.recv().await.expect("engine terminated prematurely"));
            }
            received
        };
        let ((), received) = tokio::join!(send_all, receive_all);
        received
    }

    #[tokio::test(start_paused = true)]
    async fn test_reliable_link() {
        let (a, mut b) = new_pair(&LossyLinkConfig::reliable());

        let received = timeout(Duration::from_secs(60), transfer(&a, &mut b, 50)).await.unwrap();
        assert_eq!(received, (0..50).map(packet).collect::<Vec<_>>());
    }

    #[rstest]
    #[case::loss(LossyLinkConfig { loss_probability: 0.2, seed: 1, ..LossyLinkConfig::default() })]
    #[case::corruption(LossyLinkConfig { corruption_probability: 0.2, seed: 2, ..LossyLinkConfig::default() })]
    #[case::duplication(LossyLinkConfig { duplication_probability: 0.3, seed: 3, ..LossyLinkConfig::default() })]
    #[case::reordering(LossyLinkConfig { reorder_probability: 0.4, seed: 4, ..LossyLinkConfig::default() })]
    #[case::everything(LossyLinkConfig { loss_probability: 0.15, corruption_probability: 0.1, duplication_probability: 0.1, reorder_probability: 0.3, seed: 5, ..LossyLinkConfig::default() })]
    #[case::everything_other_seed(LossyLinkConfig { loss_probability: 0.15, corruption_probability: 0.1, duplication_probability: 0.1, reorder_probability: 0.3, seed: 99, ..LossyLinkConfig::default() })]
    #[tokio::test(start_paused = true)]
    async fn test_in_order_delivery_over_faulty_link(#[case] link_config: LossyLinkConfig) {
        let (a, mut b) = new_pair(&link_config);

        let received = timeout(Duration::from_secs(3600), transfer(&a, &mut b, 100)).await.unwrap();
        assert_eq!(received, (0..100).map(packet).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bidirectional_transfer_over_faulty_link() {
        let link_config = LossyLinkConfig {
            loss_probability: 0.1,
            corruption_probability: 0.1,
            reorder_probability: 0.2,
            seed: 42,
            ..LossyLinkConfig::default()
        };
        let (mut a, mut b) = new_pair(&link_config);

        let side_a = async {
            let mut received = Vec::new();
            for i in 0..60 {
                a.send(packet(i)).await.unwrap();
            }
            for _ in 0..60 {
                received.push(a.recv().await.unwrap());
            }
            received
        };
        let side_b = async {
            let mut received = Vec::new();
            for i in 0..60 {
                b.send(packet(1000 + i)).await.unwrap();
            }
            for _ in 0..60 {
                received.push(b.recv().await.unwrap());
            }
            received
        };

        let (at_a, at_b) = timeout(Duration::from_secs(3600), async { tokio::join!(side_a, side_b) }).await.unwrap();
        assert_eq!(at_a, (1000..1060).map(packet).collect::<Vec<_>>());
        assert_eq!(at_b, (0..60).map(packet).collect::<Vec<_>>());
    }

    /// `b` never reads what `a` sends, which must not keep `b` from sending
    #[tokio::test(start_paused = true)]
    async fn test_transfer_completes_while_peer_does_not_read() {
        let (link_a, link_b) = lossy_link(&LossyLinkConfig::reliable()).unwrap();
        let config = Arc::new(SwpConfig {
            delivery_queue_len: 2,
            ..SwpConfig::default()
        });
        let mut a = Session::spawn(config.clone(), link_a).unwrap();
        let b = Session::spawn(config.clone(), link_b).unwrap();

        for i in 0..config.packet_queue_len {
            a.send(packet(i)).await.unwrap();
        }

        let received = timeout(Duration::from_secs(3600), transfer(&b, &mut a, 200)).await.unwrap();
        assert_eq!(received, (0..200).map(packet).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_packet() {
        let (a, _b) = new_pair(&LossyLinkConfig::reliable());
        let oversized = Packet::from(vec![0u8; SwpConfig::default().max_payload_len + 1]);
        assert!(a.send(oversized).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_config() {
        let (a, _b) = lossy_link(&LossyLinkConfig::reliable()).unwrap();
        let config = SwpConfig {
            ack_timeout: Duration::from_secs(1),
            retransmission_timeout: Duration::from_millis(10),
            ..SwpConfig::default()
        };
        assert!(Session::spawn(Arc::new(config), a).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_terminates_when_peer_is_dropped() {
        let (a, mut b) = new_pair(&LossyLinkConfig::reliable());
        a.send("bye").await.unwrap();
        assert_eq!(b.recv().await, Some(Packet::from("bye")));

        drop(a);
        assert_eq!(timeout(Duration::from_secs(60), b.recv()).await.unwrap(), None);
        assert!(b.is_terminated());
        assert!(b.send("x").await.is_err());
    }

    #[tokio::test]
    async fn test_udp_sessions() {
        let socket_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr_a = socket_a.local_addr().unwrap();
        let addr_b = socket_b.local_addr().unwrap();

        let config = Arc::new(SwpConfig::default());
        let a = Session::spawn_udp(config.clone(), socket_a, addr_b).unwrap();
        let mut b = Session::spawn_udp(config, socket_b, addr_a).unwrap();

        let received = timeout(Duration::from_secs(30), transfer(&a, &mut b, 20)).await.unwrap();
        assert_eq!(received, (0..20).map(packet).collect::<Vec<_>>());
    }
}
