//! Role election and the TCP simultaneous-open attempt.
//!
//! Both sides hold a NAT binding for their discovery UDP port, kept fresh by
//! the broadcast loop. Opening the TCP flow from that same local port toward
//! the peer's discovered public endpoint reuses the binding on NATs with
//! endpoint-independent mapping.

use std::cmp::Ordering;
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use tokio::net::TcpStream;

use crate::socket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Active opener: delay, then connect to the peer.
    Dial,
    /// Passive side: listen on the reclaimed port.
    Listen,
}

/// Deterministic, antisymmetric role election: the side with the greater
/// `(id, name)` key listens, the other dials. The name is the tie-break for
/// id collisions; names are unique because the registry is keyed by them.
pub fn elect_role(local_id: u64, local_name: &str, peer_id: u64, peer_name: &str) -> Role {
    match (peer_id, peer_name).cmp(&(local_id, local_name)) {
        Ordering::Greater => Role::Dial,
        _ => Role::Listen,
    }
}

/// One simultaneous-open attempt from a fixed local port.
#[derive(Clone, Debug)]
pub struct HolePuncher {
    pub local_port: u16,
    pub dial_delay: Duration,
    pub connect_timeout: Duration,
    pub connect_retries: usize,
    pub retry_backoff: Duration,
}

impl HolePuncher {
    /// Waits `dial_delay` (letting the peer's listener come up), then
    /// connects to `peer` from `local_port`. Each attempt gets its own
    /// timeout; retries use linear backoff.
    pub async fn dial(&self, peer: SocketAddrV4) -> io::Result<TcpStream> {
        tokio::time::sleep(self.dial_delay).await;
        let addr = SocketAddr::V4(peer);
        let mut attempt = 0;
        loop {
            let rs = tokio::time::timeout(self.connect_timeout, self.connect_once(addr)).await;
            let err = match rs {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => e,
                Err(_) => io::Error::new(io::ErrorKind::TimedOut, format!("connect {addr}")),
            };
            if attempt >= self.connect_retries {
                return Err(err);
            }
            attempt += 1;
            log::warn!("tcp connect {addr} attempt {attempt}: {err:?}");
            tokio::time::sleep(self.retry_backoff * attempt as u32).await;
        }
    }

    async fn connect_once(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = socket::create_tcp(self.local_port)?;
        socket.connect(addr).await
    }

    /// Listens on `local_port` and accepts the first inbound connection.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let listener = socket::create_tcp_listener(self.local_port)?;
        listener.accept().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn election_is_deterministic_and_antisymmetric() {
        // id 200 dials, id 100 listens, regardless of which side asks
        assert_eq!(elect_role(200, "b", 100, "a"), Role::Listen);
        assert_eq!(elect_role(100, "a", 200, "b"), Role::Dial);
    }

    #[test]
    fn id_collision_falls_back_to_name() {
        assert_eq!(elect_role(7, "alice", 7, "bob"), Role::Dial);
        assert_eq!(elect_role(7, "bob", 7, "alice"), Role::Listen);
    }

    #[tokio::test]
    async fn dial_reaches_listener_from_fixed_port() {
        let listener = socket::create_tcp_listener(0).unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await });

        let active = HolePuncher {
            local_port: 0,
            dial_delay: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(1),
            connect_retries: 2,
            retry_backoff: Duration::from_millis(50),
        };
        let peer = SocketAddrV4::new(std::net::Ipv4Addr::LOCALHOST, port);
        let stream = active.dial(peer).await.unwrap();
        let (_accepted, from) = accept.await.unwrap().unwrap();
        assert_eq!(from.port(), stream.local_addr().unwrap().port());
    }
}
