//! Datagram transport used by the protocol engine, heartbeat and handshake.
//!
//! Production code runs on `tokio::net::UdpSocket`; tests plug in their own
//! implementation to observe or fail sends.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

pub trait Transport: Send + Sync + 'static {
    fn send_to(
        &self,
        bytes: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for UdpSocket {
    async fn send_to(&self, bytes: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, bytes, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}
