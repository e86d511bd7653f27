use std::time::Duration;

pub const DEFAULT_STUN_SERVER: &str = "stun.l.google.com:19302";

/// Node construction parameters. `name` is required; a designated `friend`
/// enables the TCP hole-punch phases, its absence yields the UDP-only
/// broadcaster behavior.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub name: String,
    pub friend: Option<String>,
    pub stun_server: String,
    pub rendezvous_url: String,
    pub stun_interval: Duration,
    pub sync_interval: Duration,
    pub sync_jitter: Duration,
    pub broadcast_interval: Duration,
    pub dial_delay: Duration,
    pub connect_timeout: Duration,
    pub connect_retries: usize,
    pub retry_backoff: Duration,
    pub http_timeout: Duration,
    pub upsert_retries: usize,
    /// Random when unset. Fixed ids are for tests.
    pub node_id: Option<u64>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, rendezvous_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friend: None,
            stun_server: DEFAULT_STUN_SERVER.to_string(),
            rendezvous_url: rendezvous_url.into(),
            stun_interval: Duration::from_millis(100),
            sync_interval: Duration::from_millis(150),
            sync_jitter: Duration::from_millis(50),
            broadcast_interval: Duration::from_millis(100),
            dial_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            connect_retries: 3,
            retry_backoff: Duration::from_millis(500),
            http_timeout: Duration::from_secs(3),
            upsert_retries: 3,
            node_id: None,
        }
    }

    pub fn set_friend(mut self, friend: impl Into<String>) -> Self {
        self.friend.replace(friend.into());
        self
    }
    pub fn set_stun_server(mut self, stun_server: impl Into<String>) -> Self {
        self.stun_server = stun_server.into();
        self
    }
    pub fn set_stun_interval(mut self, stun_interval: Duration) -> Self {
        self.stun_interval = stun_interval;
        self
    }
    pub fn set_sync_interval(mut self, sync_interval: Duration) -> Self {
        self.sync_interval = sync_interval;
        self
    }
    pub fn set_sync_jitter(mut self, sync_jitter: Duration) -> Self {
        self.sync_jitter = sync_jitter;
        self
    }
    pub fn set_broadcast_interval(mut self, broadcast_interval: Duration) -> Self {
        self.broadcast_interval = broadcast_interval;
        self
    }
    pub fn set_dial_delay(mut self, dial_delay: Duration) -> Self {
        self.dial_delay = dial_delay;
        self
    }
    pub fn set_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
    pub fn set_connect_retries(mut self, connect_retries: usize) -> Self {
        self.connect_retries = connect_retries;
        self
    }
    pub fn set_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
    pub fn set_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }
    pub fn set_upsert_retries(mut self, upsert_retries: usize) -> Self {
        self.upsert_retries = upsert_retries;
        self
    }
    pub fn set_node_id(mut self, node_id: u64) -> Self {
        self.node_id.replace(node_id);
        self
    }
}
