use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::node::context::NodeContext;

/// Sends one sequence-tagged text datagram to every known peer per tick,
/// over the discovery socket. Keepalive, NAT-binding refresh and liveness
/// probe in one. A failed send to one peer does not stop the pass.
pub(crate) async fn broadcast_loop(
    socket: Arc<UdpSocket>,
    context: NodeContext,
    interval: Duration,
) {
    loop {
        for (peer_name, endpoint) in context.peer_endpoints() {
            let message = format!(
                "Message from {} to {} id:{}",
                context.name(),
                peer_name,
                context.next_seq()
            );
            log::debug!("sending to {peer_name}@{endpoint}: {message}");
            if let Err(e) = socket
                .send_to(message.as_bytes(), SocketAddr::V4(endpoint))
                .await
            {
                log::warn!("broadcast to {peer_name}@{endpoint}: {e:?}");
            }
        }
        tokio::time::sleep(interval).await;
    }
}
