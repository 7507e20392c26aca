//! Client Session
//!
//! Per-connection state (selected namespace, admin flag) and command
//! execution against the engine.

use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, ShelfError};
use crate::index::{IndexEntry, KeyMode};
use crate::namespace::{NamespaceHandle, DEFAULT_NAMESPACE};
use crate::protocol::{Command, Reply};

use super::Engine;

/// WAIT timeout when none is given
const WAIT_DEFAULT_MS: u64 = 5_000;

/// Accepted WAIT timeouts
const WAIT_MIN_MS: u64 = 100;
const WAIT_MAX_MS: u64 = 30 * 60 * 1_000;

/// One client's view of the engine
pub struct Session {
    engine: Arc<Engine>,
    namespace: NamespaceHandle,
    admin: bool,
}

impl Session {
    /// Start on the default namespace; without an admin password every
    /// session is admin
    pub fn new(engine: Arc<Engine>) -> Result<Self> {
        let namespace = engine.namespaces().select(DEFAULT_NAMESPACE, None)?;
        let admin = engine.config().admin_password.is_none();
        Ok(Self {
            engine,
            namespace,
            admin,
        })
    }

    /// Currently selected namespace
    pub fn namespace(&self) -> &NamespaceHandle {
        &self.namespace
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Execute a command and build its reply
    ///
    /// Errors are returned as values; the caller turns them into error
    /// replies without dropping the connection.
    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        self.engine.stats().commands.fetch_add(1, Ordering::Relaxed);

        let name = command.name();
        // SELECT replaces the handle; waiters of the issuing namespace fire
        let watchers = self.namespace.shared_watchers();
        let reply = self.dispatch(command)?;

        if name != "WAIT" {
            watchers.notify(name);
        }
        Ok(reply)
    }

    fn dispatch(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::Ping => Ok(Reply::Status("PONG".to_string())),

            // -----------------------------------------------------------------
            // Keys
            // -----------------------------------------------------------------
            Command::Set {
                key,
                value,
                timestamp,
            } => self.set(key, value, timestamp),

            Command::Get { key } => match self.namespace.get(&key) {
                Ok(payload) => Ok(Reply::Bulk(payload)),
                Err(ShelfError::KeyNotFound) => Ok(Reply::Nil),
                Err(e) => Err(e),
            },

            Command::Mget { keys } => Ok(Reply::Array(
                self.namespace
                    .get_many(&keys)?
                    .into_iter()
                    .map(|payload| payload.map_or(Reply::Nil, Reply::Bulk))
                    .collect(),
            )),

            Command::Del { key } => {
                self.namespace.delete(&key)?;
                Ok(Reply::ok())
            }

            Command::Exists { key } => Ok(Reply::Integer(self.namespace.exists(&key) as i64)),

            Command::Check { key } => match self.namespace.check(&key) {
                Ok(valid) => Ok(Reply::Integer(valid as i64)),
                Err(ShelfError::KeyNotFound) => Ok(Reply::Nil),
                Err(e) => Err(e),
            },

            Command::Scan { cursor } => Ok(scan_reply(self.namespace.scan(cursor.as_deref())?)),
            Command::Rscan { cursor } => Ok(scan_reply(self.namespace.rscan(cursor.as_deref())?)),

            Command::History { key } => {
                let items = self
                    .namespace
                    .history(&key)?
                    .into_iter()
                    .map(|item| {
                        Reply::Array(vec![
                            Reply::Integer(item.timestamp as i64),
                            Reply::Bulk(item.payload),
                        ])
                    })
                    .collect();
                Ok(Reply::Array(items))
            }

            Command::Kscan { prefix } => {
                let keys = self.namespace.keys_with_prefix(&prefix)?;
                if keys.is_empty() {
                    return Err(ShelfError::KeyNotFound);
                }
                Ok(Reply::Array(vec![
                    Reply::bulk("0"),
                    Reply::Array(keys.into_iter().map(Reply::Bulk).collect()),
                ]))
            }

            // Cursors are the keys themselves
            Command::Keycur { key } => {
                if !self.namespace.exists(&key) {
                    return Err(ShelfError::KeyNotFound);
                }
                Ok(Reply::Bulk(key))
            }

            Command::Flush => {
                self.namespace.flush(self.engine.config())?;
                Ok(Reply::ok())
            }

            Command::DbSize => Ok(Reply::Integer(self.namespace.len() as i64)),

            // -----------------------------------------------------------------
            // Namespaces
            // -----------------------------------------------------------------
            Command::NsNew { name, mode } => {
                self.require_admin()?;
                let mode = mode.as_deref().map(KeyMode::parse).transpose()?;
                self.engine.namespaces().create(&name, mode)?;
                Ok(Reply::ok())
            }

            Command::NsDel { name } => {
                self.require_admin()?;
                self.engine.namespaces().delete(&name)?;
                Ok(Reply::ok())
            }

            Command::NsSet {
                name,
                property,
                value,
            } => {
                self.require_admin()?;
                self.engine.namespaces().set(&name, &property, &value)?;
                Ok(Reply::ok())
            }

            Command::NsInfo { name } => {
                let info = self.engine.namespaces().info(&name)?;
                let mut text = String::new();
                let _ = writeln!(text, "# namespace");
                let _ = writeln!(text, "name: {}", info.name);
                let _ = writeln!(text, "entries: {}", info.entries);
                let _ = writeln!(text, "public: {}", yes_no(info.public));
                let _ = writeln!(text, "password: {}", yes_no(info.protected));
                let _ = writeln!(text, "data_size_bytes: {}", info.data_size_bytes);
                let _ = writeln!(text, "data_limits_bytes: {}", info.data_limits_bytes);
                let _ = writeln!(text, "mode: {}", info.mode.as_str());
                let _ = writeln!(text, "data_current_fileid: {}", info.active_data_file);
                let _ = writeln!(text, "clients: {}", info.sessions);
                Ok(Reply::Bulk(text.into_bytes()))
            }

            Command::NsList => Ok(Reply::Array(
                self.engine
                    .namespaces()
                    .list()
                    .into_iter()
                    .map(|name| Reply::Bulk(name.into_bytes()))
                    .collect(),
            )),

            Command::Select { name, password } => {
                self.namespace = self.engine.namespaces().select(&name, password.as_deref())?;
                tracing::debug!(
                    "Selected namespace '{}' ({})",
                    name,
                    if self.namespace.is_writable() { "read-write" } else { "read-only" }
                );
                Ok(Reply::ok())
            }

            Command::Reload { name } => {
                self.require_admin()?;
                self.engine.namespaces().reload(&name)?;
                Ok(Reply::ok())
            }

            // -----------------------------------------------------------------
            // Connection & Server
            // -----------------------------------------------------------------
            Command::Auth { password } => match &self.engine.config().admin_password {
                Some(expected) if *expected == password => {
                    self.admin = true;
                    Ok(Reply::ok())
                }
                Some(_) => Err(ShelfError::AuthFailed),
                None => Err(ShelfError::Forbidden("no admin password configured".to_string())),
            },

            Command::Wait {
                command,
                timeout_ms,
            } => {
                let timeout_ms = timeout_ms.unwrap_or(WAIT_DEFAULT_MS);
                if !(WAIT_MIN_MS..=WAIT_MAX_MS).contains(&timeout_ms) {
                    return Err(ShelfError::InvalidValue(format!(
                        "timeout must be within {}..={} ms",
                        WAIT_MIN_MS, WAIT_MAX_MS
                    )));
                }

                let watchers = self.namespace.watchers();
                let subscription = watchers.subscribe(&command);
                match watchers.wait(subscription, Duration::from_millis(timeout_ms)) {
                    Some(fired) => Ok(Reply::Status(fired)),
                    None => Err(ShelfError::Timeout(command)),
                }
            }

            Command::Info => Ok(Reply::Bulk(self.server_info().into_bytes())),

            Command::Time => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Ok(Reply::Array(vec![
                    Reply::bulk(now.as_secs().to_string()),
                    Reply::bulk(now.subsec_micros().to_string()),
                ]))
            }

            Command::Stop => {
                self.require_admin()?;
                self.engine.request_shutdown();
                Ok(Reply::Status("Stopping".to_string()))
            }
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>, timestamp: Option<u64>) -> Result<Reply> {
        let key = match (self.namespace.mode(), key.is_empty()) {
            (KeyMode::Sequential, true) => None,
            _ => Some(key.as_slice()),
        };

        let outcome = match timestamp {
            Some(ts) => {
                self.require_admin()?;
                self.namespace.set_with_timestamp(key, &value, ts)?
            }
            None => self.namespace.set(key, &value)?,
        };

        if outcome.changed {
            Ok(Reply::Bulk(outcome.key))
        } else {
            Ok(Reply::Nil)
        }
    }

    fn require_admin(&self) -> Result<()> {
        if self.admin {
            Ok(())
        } else {
            Err(ShelfError::Forbidden("permission denied".to_string()))
        }
    }

    fn server_info(&self) -> String {
        let stats = self.engine.stats();
        let config = self.engine.config();
        let mut text = String::new();

        let _ = writeln!(text, "# server");
        let _ = writeln!(text, "version: {}", crate::VERSION);
        let _ = writeln!(text, "uptime_seconds: {}", self.engine.uptime().as_secs());
        let _ = writeln!(text, "default_mode: {}", config.default_mode.as_str());
        let _ = writeln!(text, "datafile_max_size: {}", config.datafile_max_size);
        let _ = writeln!(text);
        let _ = writeln!(text, "# clients");
        let _ = writeln!(text, "clients_connected: {}", stats.clients.load(Ordering::Relaxed));
        let _ = writeln!(text, "connections_total: {}", stats.connections.load(Ordering::Relaxed));
        let _ = writeln!(text);
        let _ = writeln!(text, "# stats");
        let _ = writeln!(text, "commands_executed: {}", stats.commands.load(Ordering::Relaxed));
        let _ = writeln!(text, "namespaces: {}", self.engine.namespaces().count());
        text
    }
}

/// `[cursor, [[key, length, timestamp]]]`
fn scan_reply(entry: IndexEntry) -> Reply {
    let item = Reply::Array(vec![
        Reply::Bulk(entry.key.clone()),
        Reply::Integer(entry.length as i64),
        Reply::Integer(entry.timestamp as i64),
    ]);
    Reply::Array(vec![Reply::Bulk(entry.key), Reply::Array(vec![item])])
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
