use crate::prelude::CoreResult;
use crate::session::SessionContext;
use log::{error, info, trace};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Sends the latest published packet to the session destination.
pub struct Transmitter {
    socket: UdpSocket,
    session: Arc<SessionContext>,
    data_port: u16,
    buf: Vec<u8>,
}

impl Transmitter {
    pub async fn bind(session: Arc<SessionContext>, data_port: u16) -> CoreResult<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        info!(
            target: "transmit",
            "streaming to {}:{}",
            session.destination(),
            data_port
        );
        Ok(Self {
            socket,
            session,
            data_port,
            buf: Vec::new(),
        })
    }

    pub fn destination(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.session.destination(), self.data_port))
    }

    /// Sends whatever packet is in the slot right now as one datagram.
    pub async fn send_latest(&mut self) -> CoreResult<usize> {
        self.session.packets().encode_latest(&mut self.buf);
        let sent = self.socket.send_to(&self.buf, self.destination()).await?;
        Ok(sent)
    }

    /// Waits for each packet-ready signal and sends. Signals that arrive
    /// while a send is in flight collapse into one.
    pub async fn run(mut self) {
        loop {
            self.session.packets().wait_ready().await;
            match self.send_latest().await {
                Ok(sent) => {
                    self.session.metrics().record_sent();
                    trace!(target: "transmit", "sent {} bytes", sent);
                }
                Err(err) => {
                    self.session.metrics().record_send_error();
                    error!(target: "transmit", "error sending packet: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{MeasurementPacket, PacketLayout};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn receiver() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn selected_session(layout: PacketLayout) -> Arc<SessionContext> {
        let session = SessionContext::new(Ipv4Addr::BROADCAST, layout);
        session
            .select("127.0.0.1:9".parse().unwrap(), Ipv4Addr::LOCALHOST)
            .unwrap();
        session
    }

    #[tokio::test]
    async fn sends_published_packet_byte_for_byte() {
        let layout = PacketLayout::new(6, 80);
        let (rx, port) = receiver().await;
        let session = selected_session(layout);
        let mut packet = MeasurementPacket::new(layout);
        packet.packet_count = 41;
        packet.channel_mut(3)[7] = -12;
        session.packets().publish(&packet);

        let mut tx = Transmitter::bind(Arc::clone(&session), port).await.unwrap();
        assert_eq!(tx.send_latest().await.unwrap(), 1000);

        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(1), rx.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], packet.to_bytes().as_slice());
    }

    #[tokio::test]
    async fn run_sends_latest_after_coalesced_signals() {
        let layout = PacketLayout::new(2, 4);
        let (rx, port) = receiver().await;
        let session = selected_session(layout);

        let mut packet = MeasurementPacket::new(layout);
        for count in 0..3 {
            packet.packet_count = count;
            session.packets().publish(&packet);
        }

        let tx = Transmitter::bind(Arc::clone(&session), port).await.unwrap();
        let handle = tokio::spawn(tx.run());

        let mut buf = [0u8; 256];
        let (len, _) = timeout(Duration::from_secs(1), rx.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let received = MeasurementPacket::decode(&buf[..len], layout).unwrap();
        assert_eq!(received.packet_count, 2);

        let extra = timeout(Duration::from_millis(100), rx.recv_from(&mut buf)).await;
        assert!(extra.is_err(), "three publishes should produce one send");
        assert_eq!(session.metrics().snapshot().packets_sent, 1);
        handle.abort();
    }
}
