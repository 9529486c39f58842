use std::net::SocketAddr;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use crate::frame::Frame;

/// The protocol engine's view of the link: frames go out fire-and-forget. Delivery is not
///  guaranteed, and transmission errors are not reported back - the protocol retransmits.
///
/// Inbound frames reach the engine as raw bytes through its [crate::event_source::EventSource].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PhysicalLayer: Send + Sync + 'static {
    async fn to_physical_layer(&self, frame: &Frame);
}

/// Encodes frames and puts them into a channel. The other end of the channel is typically an
///  in-memory link to a peer engine.
pub struct ChannelPhysicalLayer {
    outbound: mpsc::Sender<Bytes>,
}

impl ChannelPhysicalLayer {
    pub fn new(outbound: mpsc::Sender<Bytes>) -> ChannelPhysicalLayer {
        ChannelPhysicalLayer { outbound }
    }
}

#[async_trait]
impl PhysicalLayer for ChannelPhysicalLayer {
    async fn to_physical_layer(&self, frame: &Frame) {
        trace!("sending {:?}", frame);
        if self.outbound.send(frame.encode()).await.is_err() {
            error!("physical layer channel is closed - dropping {:?}", frame);
        }
    }
}

/// Sends each frame as a single UDP datagram to a fixed peer
pub struct UdpPhysicalLayer {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
}

impl UdpPhysicalLayer {
    pub fn new(socket: Arc<UdpSocket>, peer_addr: SocketAddr) -> UdpPhysicalLayer {
        UdpPhysicalLayer { socket, peer_addr }
    }
}

#[async_trait]
impl PhysicalLayer for UdpPhysicalLayer {
    async fn to_physical_layer(&self, frame: &Frame) {
        trace!("UDP: sending {:?} to {:?}", frame, self.peer_addr);
        if let Err(e) = self.socket.send_to(&frame.encode(), self.peer_addr).await {
            error!("error sending UDP datagram to {:?}: {}", self.peer_addr, e);
        }
    }
}

/// Spawns a task that reads datagrams from `socket` and forwards those from `peer_addr` into
///  `frames` for decoding by the event source. The task terminates when `frames` is closed.
pub fn spawn_udp_receiver(socket: Arc<UdpSocket>, peer_addr: SocketAddr, max_frame_len: usize, frames: mpsc::Sender<Bytes>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting UDP receive loop for peer {:?}", peer_addr);

        // NB: one byte more than the longest valid frame, so oversized datagrams are recognizable
        //  instead of being silently truncated to a valid length
        let mut buf = vec![0u8; max_frame_len + 1];
        loop {
            let (num_read, from) = match socket.recv_from(&mut buf).await {
                Ok(x) => x,
                Err(e) => {
                    error!("socket error: {}", e);
                    continue;
                }
            };

            if from != peer_addr {
                warn!("received datagram from {:?} which is not the peer {:?} - dropping", from, peer_addr);
                continue;
            }
            if num_read > max_frame_len {
                debug!("received datagram exceeding the maximum frame length of {} - dropping", max_frame_len);
                continue;
            }

            trace!("UDP: received {} bytes from {:?}", num_read, from);
            if frames.send(Bytes::copy_from_slice(&buf[..num_read])).await.is_err() {
                info!("frame channel closed - terminating UDP receive loop");
                break;
            }
        }
    })
}
