//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;

use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP server for shelfdb
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
}

impl Server {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            engine,
            listener,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until shutdown is requested (blocking)
    ///
    /// Open connections are not interrupted; they end when their
    /// client disconnects.
    pub fn run(&self) -> Result<()> {
        while !self.engine.is_shutting_down() {
            match self.listener.accept() {
                Ok((stream, addr)) => self.spawn_connection(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("Server loop stopped, flushing namespaces");
        self.engine.sync_all()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.engine.request_shutdown();
    }

    fn spawn_connection(&self, mut stream: TcpStream, addr: SocketAddr) {
        let stats = self.engine.stats();

        if stats.clients.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!("Rejecting {}: connection limit reached", addr);
            let _ = stream.write_all(b"-Too many connections\r\n");
            return;
        }

        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Cannot configure socket for {}: {}", addr, e);
            return;
        }

        stats.clients.fetch_add(1, Ordering::SeqCst);
        stats.connections.fetch_add(1, Ordering::Relaxed);

        let engine = Arc::clone(&self.engine);
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                let result = Connection::new(stream, Arc::clone(&engine)).and_then(|mut conn| {
                    conn.set_timeouts(read_ms, write_ms)?;
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection {} ended with error: {}", addr, e);
                }
                engine.stats().clients.fetch_sub(1, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            tracing::error!("Cannot spawn thread for {}: {}", addr, e);
            stats.clients.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
