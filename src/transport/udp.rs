use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Transport;
use crate::error::TransportError;
use crate::membership::types::NodeId;

/// Largest payload that fits in a single IPv4 UDP datagram.
pub const MAX_DATAGRAM: usize = 65_507;

/// Membership transport over a UDP socket.
///
/// Sends go straight to a non-blocking socket. A background task receives
/// datagrams and queues them until the next `drain_inbound`.
pub struct UdpTransport {
    local: NodeId,
    sender: std::net::UdpSocket,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    receive_handle: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds `bind_addr` and starts the receive loop. Must run inside a tokio runtime.
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = std::net::UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;

        let local = NodeId::try_from(socket.local_addr()?)
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

        let receiver = tokio::net::UdpSocket::from_std(socket.try_clone()?)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let receive_handle = tokio::spawn(receive_loop(receiver, tx));

        tracing::info!("UDP transport bound to {}", local);

        Ok(Self {
            local,
            sender: socket,
            inbound: Mutex::new(rx),
            receive_handle,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receive_handle.abort();
    }
}

impl Transport for UdpTransport {
    fn send(&self, dst: NodeId, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_DATAGRAM {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }
        if self.receive_handle.is_finished() {
            return Err(TransportError::Closed);
        }
        self.sender.send_to(&payload, dst.socket_addr())?;
        Ok(())
    }

    fn drain_inbound(&self) -> Vec<Bytes> {
        let mut rx = self.inbound.lock().unwrap_or_else(|p| p.into_inner());
        let mut payloads = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            payloads.push(payload);
        }
        payloads
    }
}

async fn receive_loop(socket: tokio::net::UdpSocket, tx: mpsc::UnboundedSender<Bytes>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                tracing::trace!("Received {} bytes from {}", len, src);
                if tx.send(Bytes::copy_from_slice(&buf[..len])).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to receive UDP packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for_inbound(transport: &UdpTransport) -> Vec<Bytes> {
        for _ in 0..50 {
            let payloads = transport.drain_inbound();
            if !payloads.is_empty() {
                return payloads;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Vec::new()
    }

    #[tokio::test]
    async fn test_udp_datagram_round_trip() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        a.send(b.local_id(), Bytes::from_static(b"heartbeat"))
            .unwrap();

        let received = wait_for_inbound(&b).await;
        assert_eq!(received, vec![Bytes::from_static(b"heartbeat")]);
        assert!(a.drain_inbound().is_empty());
    }

    #[tokio::test]
    async fn test_udp_rejects_oversized_payload() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let payload = Bytes::from(vec![0u8; MAX_DATAGRAM + 1]);

        assert!(matches!(
            a.send(a.local_id(), payload),
            Err(TransportError::PayloadTooLarge(_))
        ));
    }
}
