//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::game::{ParticipantId, SessionHandle};
use crate::util::time::unix_millis;

/// One live WebSocket connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connected_at: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session: SessionHandle,
    pub connections: Arc<DashMap<ParticipantId, ConnectionInfo>>,
}

impl AppState {
    pub fn new(config: Config, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            session,
            connections: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, participant: ParticipantId) {
        self.connections.insert(
            participant,
            ConnectionInfo {
                connected_at: unix_millis(),
            },
        );
    }

    pub fn unregister(&self, participant: ParticipantId) -> Option<ConnectionInfo> {
        self.connections.remove(&participant).map(|(_, info)| info)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether another participant can be admitted
    pub fn has_capacity(&self) -> bool {
        self.connection_count() < self.config.max_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Session, SessionSettings};

    #[test]
    fn test_connection_registry() {
        let config = Config {
            max_players: 1,
            ..Config::default()
        };
        let (_session, handle) = Session::new(SessionSettings::from_config(&config));
        let state = AppState::new(config, handle);

        let who = ParticipantId::new_random();
        assert!(state.has_capacity());
        state.register(who);
        assert!(!state.has_capacity());
        assert!(state.unregister(who).is_some());
        assert_eq!(state.connection_count(), 0);
    }
}
