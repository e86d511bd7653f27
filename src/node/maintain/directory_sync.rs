use std::time::Duration;

use rand::Rng;

use crate::node::context::NodeContext;
use crate::rendezvous::RendezvousClient;

/// Pulls the full peer set from the rendezvous service and merges it into
/// the peer table. Fetch failures are logged; the next tick retries.
pub(crate) async fn directory_sync_loop(
    client: RendezvousClient,
    context: NodeContext,
    interval: Duration,
    jitter: Duration,
) {
    loop {
        match client.fetch().await {
            Ok(records) => context.merge_peers(records),
            Err(e) => log::debug!("directory fetch: {e:?}"),
        }
        let jitter_ms = if jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter.as_millis() as u64)
        };
        tokio::time::sleep(interval + Duration::from_millis(jitter_ms)).await;
    }
}
