//! Connection phases and the pure transition function.
//!
//! The machine itself performs no I/O: [`transition`] maps the current phase
//! and an incoming event to the next phase plus a list of [`Effect`]s, and
//! the node runner executes those effects. Phases only move forward; events
//! that would re-enter the current phase (late or duplicated datagrams) are
//! no-ops with no effects, so sockets are never torn down or created twice.

use std::fmt;
use std::str::FromStr;

use tokio::net::TcpStream;

use crate::error::StateError;
use crate::punch::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Init,
    DiscoveringAddress,
    AddressDiscovered,
    PreparingHandoff,
    RoleElection,
    Connecting,
    Listening,
    Streaming,
}

impl ConnectionPhase {
    /// Position in the forward ordering. `Connecting` and `Listening` are
    /// alternatives at the same stage.
    pub(crate) fn rank(self) -> u8 {
        match self {
            ConnectionPhase::Init => 0,
            ConnectionPhase::DiscoveringAddress => 1,
            ConnectionPhase::AddressDiscovered => 2,
            ConnectionPhase::PreparingHandoff => 3,
            ConnectionPhase::RoleElection => 4,
            ConnectionPhase::Connecting | ConnectionPhase::Listening => 5,
            ConnectionPhase::Streaming => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionPhase::Streaming)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionPhase::Init => "init",
            ConnectionPhase::DiscoveringAddress => "discovering-address",
            ConnectionPhase::AddressDiscovered => "address-discovered",
            ConnectionPhase::PreparingHandoff => "preparing-handoff",
            ConnectionPhase::RoleElection => "role-election",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Listening => "listening",
            ConnectionPhase::Streaming => "streaming",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionPhase {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(ConnectionPhase::Init),
            "discovering-address" => Ok(ConnectionPhase::DiscoveringAddress),
            "address-discovered" => Ok(ConnectionPhase::AddressDiscovered),
            "preparing-handoff" => Ok(ConnectionPhase::PreparingHandoff),
            "role-election" => Ok(ConnectionPhase::RoleElection),
            "connecting" => Ok(ConnectionPhase::Connecting),
            "listening" => Ok(ConnectionPhase::Listening),
            "streaming" => Ok(ConnectionPhase::Streaming),
            _ => Err(StateError::UnknownPhase(s.to_string())),
        }
    }
}

/// Inputs to the machine. `TcpEstablished` carries the connected stream so
/// the `StartSession` effect can hand it to the session.
#[derive(Debug)]
pub enum Event {
    Started,
    AddressMapped,
    FriendHeard,
    DiscoveryClosed,
    RoleElected(Role),
    TcpEstablished(TcpStream),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Started => "started",
            Event::AddressMapped => "address-mapped",
            Event::FriendHeard => "friend-heard",
            Event::DiscoveryClosed => "discovery-closed",
            Event::RoleElected(_) => "role-elected",
            Event::TcpEstablished(_) => "tcp-established",
        }
    }
}

/// I/O the runner must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Spawn the discovery-phase loops (STUN query, receive, directory
    /// sync, peer broadcast).
    StartLoops,
    /// Stop those loops and release the UDP socket, then feed
    /// [`Event::DiscoveryClosed`].
    StopDiscovery,
    /// Compare ids with the designated peer and feed
    /// [`Event::RoleElected`].
    ElectRole,
    /// Delayed TCP connect to the peer from the reclaimed local port.
    Dial,
    /// TCP listener on the reclaimed local port, accept one connection.
    Listen,
    /// Hand the established stream to the data session.
    StartSession,
}

pub fn transition(
    phase: ConnectionPhase,
    event: &Event,
) -> Result<(ConnectionPhase, Vec<Effect>), StateError> {
    use ConnectionPhase::*;
    let next = match (phase, event) {
        (Init, Event::Started) => (DiscoveringAddress, vec![Effect::StartLoops]),
        (DiscoveringAddress, Event::AddressMapped) => (AddressDiscovered, vec![]),
        (AddressDiscovered, Event::FriendHeard) => (PreparingHandoff, vec![Effect::StopDiscovery]),
        (PreparingHandoff, Event::DiscoveryClosed) => (RoleElection, vec![Effect::ElectRole]),
        (RoleElection, Event::RoleElected(Role::Dial)) => (Connecting, vec![Effect::Dial]),
        (RoleElection, Event::RoleElected(Role::Listen)) => (Listening, vec![Effect::Listen]),
        (Connecting, Event::TcpEstablished(_)) | (Listening, Event::TcpEstablished(_)) => {
            (Streaming, vec![Effect::StartSession])
        }
        // late duplicates of network-driven events are no-ops
        (p, Event::AddressMapped) if p.rank() >= AddressDiscovered.rank() => (p, vec![]),
        (p, Event::FriendHeard) if p.rank() >= PreparingHandoff.rank() => (p, vec![]),
        (p, e) => {
            return Err(StateError::InvalidTransition {
                phase: p,
                event: e.name(),
            })
        }
    };
    Ok(next)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn happy_path_without_sockets() {
        let (phase, effects) = transition(ConnectionPhase::Init, &Event::Started).unwrap();
        assert_eq!(phase, ConnectionPhase::DiscoveringAddress);
        assert_eq!(effects, vec![Effect::StartLoops]);

        let (phase, effects) = transition(phase, &Event::AddressMapped).unwrap();
        assert_eq!(phase, ConnectionPhase::AddressDiscovered);
        assert!(effects.is_empty());

        let (phase, effects) = transition(phase, &Event::FriendHeard).unwrap();
        assert_eq!(phase, ConnectionPhase::PreparingHandoff);
        assert_eq!(effects, vec![Effect::StopDiscovery]);

        let (phase, effects) = transition(phase, &Event::DiscoveryClosed).unwrap();
        assert_eq!(phase, ConnectionPhase::RoleElection);
        assert_eq!(effects, vec![Effect::ElectRole]);

        let (phase, effects) = transition(phase, &Event::RoleElected(Role::Dial)).unwrap();
        assert_eq!(phase, ConnectionPhase::Connecting);
        assert_eq!(effects, vec![Effect::Dial]);
    }

    #[test]
    fn listener_branch() {
        let (phase, effects) =
            transition(ConnectionPhase::RoleElection, &Event::RoleElected(Role::Listen)).unwrap();
        assert_eq!(phase, ConnectionPhase::Listening);
        assert_eq!(effects, vec![Effect::Listen]);
    }

    #[test]
    fn duplicate_events_are_noops() {
        for phase in [
            ConnectionPhase::AddressDiscovered,
            ConnectionPhase::PreparingHandoff,
            ConnectionPhase::RoleElection,
            ConnectionPhase::Connecting,
            ConnectionPhase::Streaming,
        ] {
            let (next, effects) = transition(phase, &Event::AddressMapped).unwrap();
            assert_eq!(next, phase);
            assert!(effects.is_empty(), "stale event must not re-run effects");
        }
        let (next, effects) =
            transition(ConnectionPhase::Connecting, &Event::FriendHeard).unwrap();
        assert_eq!(next, ConnectionPhase::Connecting);
        assert!(effects.is_empty());
    }

    #[test]
    fn out_of_order_events_fail() {
        assert!(matches!(
            transition(ConnectionPhase::Init, &Event::DiscoveryClosed),
            Err(StateError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition(ConnectionPhase::DiscoveringAddress, &Event::FriendHeard),
            Err(StateError::InvalidTransition { .. })
        ));
        assert!(matches!(
            transition(ConnectionPhase::Streaming, &Event::RoleElected(Role::Dial)),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn phase_names_round_trip() {
        for phase in [
            ConnectionPhase::Init,
            ConnectionPhase::DiscoveringAddress,
            ConnectionPhase::AddressDiscovered,
            ConnectionPhase::PreparingHandoff,
            ConnectionPhase::RoleElection,
            ConnectionPhase::Connecting,
            ConnectionPhase::Listening,
            ConnectionPhase::Streaming,
        ] {
            assert_eq!(phase.as_str().parse::<ConnectionPhase>().unwrap(), phase);
        }
    }

    #[test]
    fn unknown_phase_name_fails() {
        assert!(matches!(
            "receiveIP".parse::<ConnectionPhase>(),
            Err(StateError::UnknownPhase(_))
        ));
    }

    #[tokio::test]
    async fn established_stream_reaches_streaming() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, _accepted) = tokio::join!(tokio::net::TcpStream::connect(addr), async {
            listener.accept().await.unwrap()
        });
        let event = Event::TcpEstablished(stream.unwrap());
        let (phase, effects) = transition(ConnectionPhase::Connecting, &event).unwrap();
        assert_eq!(phase, ConnectionPhase::Streaming);
        assert_eq!(effects, vec![Effect::StartSession]);
        let (phase, _) = transition(ConnectionPhase::Listening, &event).unwrap();
        assert_eq!(phase, ConnectionPhase::Streaming);
    }
}
