//! The client node: owns the discovery socket, the maintain loops and the
//! state-machine runner that executes transition effects.

use std::collections::VecDeque;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use rand::Rng;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::NodeConfig;
use crate::error::{Error, Result, StateError};
use crate::node::context::NodeContext;
use crate::node::maintain::{directory_sync, heartbeat, stun_query};
use crate::punch::HolePuncher;
use crate::rendezvous::RendezvousClient;
use crate::session::DataSession;
use crate::state::{transition, ConnectionPhase, Effect, Event};
use crate::{socket, stun};

pub mod context;
mod maintain;

/// A running client. Dropping the handle aborts the runner and every task
/// it spawned.
pub struct Node {
    context: NodeContext,
    local_port: u16,
    _runner: OwnedJoinHandle,
}

struct OwnedJoinHandle {
    handle: JoinHandle<()>,
}

impl Drop for OwnedJoinHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(Error::InvalidArgument("name must not be empty".into()));
        }
        let node_id = config
            .node_id
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..1_000_000));
        let context = NodeContext::new(config.name.clone(), config.friend.clone(), node_id);
        let rendezvous = RendezvousClient::new(
            &config.rendezvous_url,
            config.http_timeout,
            config.upsert_retries,
            config.retry_backoff,
        )?;
        let stun_addr = resolve_stun(&config.stun_server)?;
        let udp = Arc::new(socket::bind_udp(0)?);
        let local_port = udp.local_addr()?.port();
        log::info!(
            "{}: udp discovery socket bound on port {local_port}, id {node_id}",
            config.name
        );

        let runner = tokio::spawn(run(
            config,
            context.clone(),
            rendezvous,
            stun_addr,
            udp,
            local_port,
        ));
        Ok(Self {
            context,
            local_port,
            _runner: OwnedJoinHandle { handle: runner },
        })
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.context.phase()
    }

    /// The local port shared by UDP discovery and the TCP attempt.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn public_endpoint(&self) -> Option<std::net::SocketAddrV4> {
        self.context.public_endpoint()
    }

    pub fn context(&self) -> &NodeContext {
        &self.context
    }
}

fn resolve_stun(stun_server: &str) -> Result<SocketAddr> {
    stun_server
        .to_socket_addrs()?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::InvalidArgument(format!("cannot resolve stun server {stun_server}")))
}

/// Discovery-phase runtime: the UDP socket plus every task that touches it.
/// `stop` aborts the tasks, waits for them, then drops the last socket
/// reference, so the local port is observably free when it returns. The TCP
/// bind on the same port depends on this ordering.
struct DiscoveryRuntime {
    udp: Arc<UdpSocket>,
    tasks: JoinSet<()>,
}

impl DiscoveryRuntime {
    async fn stop(mut self) {
        self.tasks.shutdown().await;
        match Arc::try_unwrap(self.udp) {
            Ok(udp) => drop(udp),
            Err(_) => log::warn!("udp socket still referenced at handoff"),
        }
        log::info!("udp discovery socket released");
    }
}

async fn run(
    config: NodeConfig,
    context: NodeContext,
    rendezvous: RendezvousClient,
    stun_addr: SocketAddr,
    udp: Arc<UdpSocket>,
    local_port: u16,
) {
    if let Err(e) = drive(config, &context, rendezvous, stun_addr, udp, local_port).await {
        log::error!("{}: node runner terminated: {e}", context.name());
    }
}

async fn drive(
    config: NodeConfig,
    context: &NodeContext,
    rendezvous: RendezvousClient,
    stun_addr: SocketAddr,
    udp: Arc<UdpSocket>,
    local_port: u16,
) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);
    let mut udp = Some(udp);
    let mut discovery: Option<DiscoveryRuntime> = None;
    // dial/listen/session tasks; aborted when the runner is dropped
    let mut handoff_tasks = JoinSet::new();
    let mut pending = VecDeque::from([Event::Started]);

    loop {
        let event = match pending.pop_front() {
            Some(event) => event,
            None => match event_rx.recv().await {
                Some(event) => event,
                None => return Ok(()),
            },
        };
        let phase = context.phase();
        let (next, effects) = transition(phase, &event)?;
        context.set_phase(next)?;
        let mut stream = match event {
            Event::TcpEstablished(stream) => Some(stream),
            _ => None,
        };

        for effect in effects {
            match effect {
                Effect::StartLoops => {
                    let Some(udp) = udp.take() else { continue };
                    let mut tasks = JoinSet::new();
                    tasks.spawn(stun_query::stun_query_loop(
                        udp.clone(),
                        stun_addr,
                        config.stun_interval,
                    ));
                    tasks.spawn(recv_loop(
                        udp.clone(),
                        stun_addr,
                        context.clone(),
                        rendezvous.clone(),
                        event_tx.clone(),
                    ));
                    tasks.spawn(heartbeat::broadcast_loop(
                        udp.clone(),
                        context.clone(),
                        config.broadcast_interval,
                    ));
                    tasks.spawn(directory_sync::directory_sync_loop(
                        rendezvous.clone(),
                        context.clone(),
                        config.sync_interval,
                        config.sync_jitter,
                    ));
                    discovery = Some(DiscoveryRuntime { udp, tasks });
                }
                Effect::StopDiscovery => {
                    if let Some(runtime) = discovery.take() {
                        // answer the friend once more before the socket goes
                        // away: their transition needs a datagram from us,
                        // and the broadcast loop may not have fired since we
                        // learned their address
                        if let Some(peer) = context.friend_record() {
                            let message = format!(
                                "Message from {} to {} id:{}",
                                context.name(),
                                peer.name,
                                context.next_seq()
                            );
                            if let Err(e) = runtime
                                .udp
                                .send_to(message.as_bytes(), SocketAddr::V4(peer.endpoint()))
                                .await
                            {
                                log::warn!("final datagram to {}: {e:?}", peer.name);
                            }
                        }
                        runtime.stop().await;
                    }
                    pending.push_back(Event::DiscoveryClosed);
                }
                Effect::ElectRole => {
                    let peer = context.friend_record().ok_or_else(|| {
                        StateError::PeerUnknown(
                            context.friend().unwrap_or("<no designated peer>").to_string(),
                        )
                    })?;
                    let role = crate::punch::elect_role(
                        context.node_id(),
                        context.name(),
                        peer.id,
                        &peer.name,
                    );
                    log::info!(
                        "{}: role {role:?} (local id {}, peer {} id {})",
                        context.name(),
                        context.node_id(),
                        peer.name,
                        peer.id
                    );
                    pending.push_back(Event::RoleElected(role));
                }
                Effect::Dial => {
                    let peer = context.friend_record().ok_or_else(|| {
                        StateError::PeerUnknown(
                            context.friend().unwrap_or("<no designated peer>").to_string(),
                        )
                    })?;
                    let puncher = puncher(&config, local_port);
                    let event_tx = event_tx.clone();
                    handoff_tasks.spawn(async move {
                        match puncher.dial(peer.endpoint()).await {
                            Ok(stream) => {
                                let _ = event_tx.send(Event::TcpEstablished(stream)).await;
                            }
                            Err(e) => log::warn!("hole punch dial {}: {e:?}", peer.endpoint()),
                        }
                    });
                }
                Effect::Listen => {
                    let puncher = puncher(&config, local_port);
                    let event_tx = event_tx.clone();
                    handoff_tasks.spawn(async move {
                        match puncher.accept().await {
                            Ok((stream, from)) => {
                                log::info!("accepted tcp connection from {from}");
                                let _ = event_tx.send(Event::TcpEstablished(stream)).await;
                            }
                            Err(e) => log::warn!("hole punch listen: {e:?}"),
                        }
                    });
                }
                Effect::StartSession => {
                    let Some(stream) = stream.take() else {
                        log::error!("start-session effect without an established stream");
                        continue;
                    };
                    let active = phase == ConnectionPhase::Connecting;
                    let session =
                        DataSession::new(stream, context.name().to_string(), active);
                    handoff_tasks.spawn(session.run());
                }
            }
        }
    }
}

fn puncher(config: &NodeConfig, local_port: u16) -> HolePuncher {
    HolePuncher {
        local_port,
        dial_delay: config.dial_delay,
        connect_timeout: config.connect_timeout,
        connect_retries: config.connect_retries,
        retry_backoff: config.retry_backoff,
    }
}

/// Routes every inbound datagram on the discovery socket: STUN-server
/// traffic feeds address discovery, everything else is a peer message.
async fn recv_loop(
    udp: Arc<UdpSocket>,
    stun_addr: SocketAddr,
    context: NodeContext,
    rendezvous: RendezvousClient,
    event_tx: mpsc::Sender<Event>,
) {
    let mut buf = [0u8; 1500];
    loop {
        let (len, from) = match udp.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                log::debug!("udp recv: {e:?}");
                continue;
            }
        };
        if from == stun_addr {
            match stun::decode_binding_response(&buf[..len]) {
                Ok(Some(endpoint)) => {
                    if context.update_public_endpoint(endpoint) {
                        // fire-and-forget: a failed upsert never blocks
                        // discovery
                        let rendezvous = rendezvous.clone();
                        let context = context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = rendezvous
                                .upsert(context.name(), endpoint, context.node_id())
                                .await
                            {
                                log::warn!("registry upsert {endpoint}: {e:?}");
                            }
                        });
                    }
                    let _ = event_tx.send(Event::AddressMapped).await;
                }
                Ok(None) => {}
                Err(e) => log::warn!("stun response from {from}: {e}"),
            }
            continue;
        }
        let text = String::from_utf8_lossy(&buf[..len]);
        match context.peer_by_addr(from) {
            Some(peer) => {
                log::info!("{}: datagram from {}: {text}", context.name(), peer.name);
                if context.friend() == Some(peer.name.as_str()) {
                    let _ = event_tx.send(Event::FriendHeard).await;
                }
            }
            None => log::debug!(
                "{}: datagram from unknown sender {from}: {text}",
                context.name()
            ),
        }
    }
}
