use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::stun;

/// Fires a Binding Request at the STUN server on every tick. Responses come
/// back through the shared receive loop; no reply tracking is needed because
/// the next tick is the retry.
pub(crate) async fn stun_query_loop(
    socket: Arc<UdpSocket>,
    stun_addr: SocketAddr,
    interval: Duration,
) {
    loop {
        let request = stun::binding_request();
        if let Err(e) = socket.send_to(&request, stun_addr).await {
            log::debug!("stun request {stun_addr}: {e:?}");
        }
        tokio::time::sleep(interval).await;
    }
}
