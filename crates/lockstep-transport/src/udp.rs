//! UDP transport implementation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use lockstep_core::{LockstepError, LockstepResult};
use lockstep_wire::{SyncFrame, FRAME_SIZE};

/// Receive buffer size; anything larger than a frame is rejected by the parser
const RECV_BUFFER_SIZE: usize = 512;

/// UDP transport for sync frames
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> LockstepResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| LockstepError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| LockstepError::TransportError(e.to_string()))?;

        Ok(UdpTransport {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a frame to one destination
    pub async fn send_frame(&self, frame: &SyncFrame, dest: SocketAddr) -> LockstepResult<()> {
        self.send_bytes_to(&frame.encode(), dest).await
    }

    /// Send an already encoded frame to one destination
    pub async fn send_bytes_to(&self, bytes: &[u8], dest: SocketAddr) -> LockstepResult<()> {
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(|e| LockstepError::TransportError(e.to_string()))?;
        Ok(())
    }

    /// Send an encoded frame to every peer. Per-peer failures are logged and
    /// skipped; the number of successful sends is returned.
    pub async fn broadcast_bytes(&self, bytes: &[u8], peers: &[SocketAddr]) -> usize {
        let mut sent = 0;
        for peer in peers {
            match self.send_bytes_to(bytes, *peer).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(%peer, "UDP send failed: {}", e),
            }
        }
        sent
    }

    /// Receive and parse one frame
    pub async fn recv_frame(&self) -> LockstepResult<(SyncFrame, SocketAddr)> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| LockstepError::TransportError(e.to_string()))?;

        let frame = SyncFrame::parse(&buf[..len])?;
        Ok((frame, addr))
    }

    /// Socket handle for the background receive loop
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

/// Raw datagrams received by the background loop
pub type PacketReceiver = mpsc::Receiver<(Vec<u8>, SocketAddr)>;

/// Start a background receive loop forwarding raw datagrams.
/// The loop ends when the receiver is dropped.
pub fn start_receive_loop(socket: Arc<UdpSocket>, buffer_size: usize) -> PacketReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    if len != FRAME_SIZE {
                        tracing::debug!(%addr, len, "dropping datagram with wrong size");
                        continue;
                    }
                    if tx.send((buf[..len].to_vec(), addr)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{ObjectId, ReplicaId, SyncSnapshot};

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_frame_over_loopback() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let frame = SyncFrame::snapshot(
            ObjectId::new(3),
            ReplicaId::new(1),
            SyncSnapshot {
                version: 12,
                anchor_timeline_time: 4.0,
                ..SyncSnapshot::default()
            },
        );
        a.send_frame(&frame, b.local_addr()).await.unwrap();

        let (received, from) = b.recv_frame().await.unwrap();
        assert_eq!(received, frame);
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn test_receive_loop_forwards_frames() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let mut rx = start_receive_loop(b.socket(), 8);

        // wrong size first, must be skipped
        a.send_bytes_to(&[1, 2, 3], b.local_addr()).await.unwrap();
        let frame = SyncFrame::join_request(ObjectId::new(3), ReplicaId::new(9));
        let sent = a.broadcast_bytes(&frame.encode(), &[b.local_addr()]).await;
        assert_eq!(sent, 1);

        let (bytes, _) = rx.recv().await.unwrap();
        assert_eq!(SyncFrame::parse(&bytes).unwrap(), frame);
    }
}
