pub(crate) mod directory_sync;
pub(crate) mod heartbeat;
pub(crate) mod stun_query;
