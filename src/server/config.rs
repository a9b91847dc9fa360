//! Server configuration

/// Listen address used when neither flag nor environment provides one
pub const DEFAULT_LISTEN_ADDR: &str = "localhost:4242";

/// TCP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, as `host:port`. Hostnames are resolved at
    /// bind time.
    pub listen_addr: String,

    /// Enable TCP_NODELAY on subscriber connections
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a config listening on the given address
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            listen_addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the listen address
    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Toggle TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}
