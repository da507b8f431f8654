//! Client-wide configuration shared across tracker announces and peer
//! sessions, replacing the module-global peer ID constant of simpler
//! single-torrent clients with something a downloader can vary per run.
use std::time::Duration;

use crate::peer::session::SessionConfig;

/// Runtime configuration for a download: the listening port advertised to
/// trackers, and the per-session pipelining/timeout knobs every peer
/// connection inherits.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub port: u16,
    pub session: SessionConfig,
    /// How many peer sessions to run concurrently against one torrent.
    pub max_peers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 6881,
            session: SessionConfig::default(),
            max_peers: 30,
        }
    }
}

impl ClientConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_pipeline_window(mut self, window: usize) -> Self {
        self.session.pipeline_window = window;
        self
    }

    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.session.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.session.read_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_compose() {
        let config = ClientConfig::default()
            .with_port(7000)
            .with_pipeline_window(8)
            .with_max_peers(10);
        assert_eq!(config.port, 7000);
        assert_eq!(config.session.pipeline_window, 8);
        assert_eq!(config.max_peers, 10);
    }
}
