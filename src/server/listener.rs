//! Subscriber listener
//!
//! Accepts inbound TCP connections and registers each one as a subscriber
//! with the broker. Purely mechanical: a connection's remote address becomes
//! its subscriber ID, and the broker takes it from there.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::broker::{BrokerHandle, SubscriberHandle};
use crate::error::Result;
use crate::server::config::ServerConfig;

/// PCAP-over-IP subscriber server
pub struct RelayServer {
    config: ServerConfig,
    handle: BrokerHandle,
    listener: TcpListener,
}

impl RelayServer {
    /// Bind the listen address.
    ///
    /// Binding is split from [`run_until`] so callers (and tests) can read
    /// the actual port via [`local_addr`] when binding to port 0.
    ///
    /// [`run_until`]: RelayServer::run_until
    /// [`local_addr`]: RelayServer::local_addr
    pub async fn bind(config: ServerConfig, handle: BrokerHandle) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        tracing::info!(addr = %config.listen_addr, "Listening for subscribers");

        Ok(Self {
            config,
            handle,
            listener,
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept subscribers until `shutdown` resolves or the broker goes away.
    pub async fn run_until(self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        tokio::select! {
            _ = shutdown => {
                tracing::debug!("Listener shutting down");
                Ok(())
            }
            result = self.accept_loop() => result,
        }
    }

    async fn accept_loop(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, peer_addr)) => {
                    if let Err(e) = self.register(socket, peer_addr).await {
                        // Only a closed broker stops the listener
                        tracing::info!("Broker closed, listener stopping");
                        return Err(e);
                    }
                }
                Err(e) => {
                    // A single failed accept is transient: log and go on
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn register(&self, socket: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        // On failure the handle is dropped here, closing the connection
        self.handle
            .add_subscriber(SubscriberHandle::new(peer_addr.to_string(), socket))
            .await?;

        tracing::info!(peer = %peer_addr, "Subscriber connected");
        Ok(())
    }
}
