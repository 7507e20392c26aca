//! Command definitions
//!
//! Turns a request's argument vector into a typed command.

use crate::error::{Result, ShelfError};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness check
    Ping,

    /// Write a value; an empty key asks for a new sequential key
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        timestamp: Option<u64>,
    },

    Get { key: Vec<u8> },

    /// Several GETs in one round trip
    Mget { keys: Vec<Vec<u8>> },

    Del { key: Vec<u8> },
    Exists { key: Vec<u8> },

    /// Presence plus CRC check of the stored payload
    Check { key: Vec<u8> },

    Scan { cursor: Option<Vec<u8>> },
    Rscan { cursor: Option<Vec<u8>> },
    History { key: Vec<u8> },

    /// Keys starting with `prefix` (UserKey mode only)
    Kscan { prefix: Vec<u8> },

    /// SCAN cursor positioned on `key`
    Keycur { key: Vec<u8> },

    /// Drop every key and file of the selected namespace, keeping its settings
    Flush,

    // -------------------------------------------------------------------------
    // Namespaces
    // -------------------------------------------------------------------------
    NsNew { name: String, mode: Option<String> },
    NsDel { name: String },
    NsSet {
        name: String,
        property: String,
        value: String,
    },
    NsInfo { name: String },
    NsList,
    Select {
        name: String,
        password: Option<String>,
    },
    Reload { name: String },

    // -------------------------------------------------------------------------
    // Connection & Server
    // -------------------------------------------------------------------------
    Auth { password: String },

    /// Block until `command` runs in the selected namespace
    Wait {
        command: String,
        timeout_ms: Option<u64>,
    },
    DbSize,
    Info,
    Time,
    Stop,
}

impl Command {
    /// Parse an argument vector (command name first)
    pub fn parse(args: Vec<Vec<u8>>) -> Result<Self> {
        let mut args = args.into_iter();
        let name = match args.next() {
            Some(name) => String::from_utf8_lossy(&name).to_ascii_uppercase(),
            None => return Err(ShelfError::Protocol("empty request".to_string())),
        };
        let args: Vec<Vec<u8>> = args.collect();

        let command = match (name.as_str(), args.len()) {
            ("PING", 0) => Command::Ping,

            ("SET" | "SETX", 1..=3) => {
                let mut args = args.into_iter();
                let first = args.next().unwrap_or_default();
                match args.next() {
                    // SET value: new sequential key
                    None => Command::Set {
                        key: Vec::new(),
                        value: first,
                        timestamp: None,
                    },
                    Some(value) => Command::Set {
                        key: first,
                        value,
                        timestamp: args.next().map(|ts| parse_u64(&ts, "timestamp")).transpose()?,
                    },
                }
            }

            ("GET", 1) => Command::Get { key: take(args, 0) },
            ("MGET", n) if n > 0 => Command::Mget { keys: args },
            ("DEL", 1) => Command::Del { key: take(args, 0) },
            ("EXISTS", 1) => Command::Exists { key: take(args, 0) },
            ("CHECK", 1) => Command::Check { key: take(args, 0) },
            ("HISTORY", 1) => Command::History { key: take(args, 0) },
            ("KSCAN", 1) => Command::Kscan {
                prefix: take(args, 0),
            },
            ("KEYCUR", 1) => Command::Keycur { key: take(args, 0) },
            ("FLUSH", 0) => Command::Flush,

            ("SCAN" | "SCANX", 0) => Command::Scan { cursor: None },
            ("SCAN" | "SCANX", 1) => Command::Scan {
                cursor: Some(take(args, 0)),
            },
            ("RSCAN", 0) => Command::Rscan { cursor: None },
            ("RSCAN", 1) => Command::Rscan {
                cursor: Some(take(args, 0)),
            },

            ("NSNEW", 1) => Command::NsNew {
                name: text(&args[0])?,
                mode: None,
            },
            ("NSNEW", 2) => Command::NsNew {
                name: text(&args[0])?,
                mode: Some(text(&args[1])?),
            },
            ("NSDEL", 1) => Command::NsDel {
                name: text(&args[0])?,
            },
            ("NSSET", 3) => Command::NsSet {
                name: text(&args[0])?,
                property: text(&args[1])?,
                value: text(&args[2])?,
            },
            ("NSINFO", 1) => Command::NsInfo {
                name: text(&args[0])?,
            },
            ("NSLIST", 0) => Command::NsList,
            ("SELECT", 1) => Command::Select {
                name: text(&args[0])?,
                password: None,
            },
            ("SELECT", 2) => Command::Select {
                name: text(&args[0])?,
                password: Some(text(&args[1])?),
            },
            ("RELOAD", 1) => Command::Reload {
                name: text(&args[0])?,
            },

            ("AUTH", 1) => Command::Auth {
                password: text(&args[0])?,
            },
            ("WAIT", 1) => Command::Wait {
                command: text(&args[0])?,
                timeout_ms: None,
            },
            ("WAIT", 2) => Command::Wait {
                command: text(&args[0])?,
                timeout_ms: Some(parse_u64(&args[1], "timeout")?),
            },
            ("DBSIZE", 0) => Command::DbSize,
            ("INFO", 0) => Command::Info,
            ("TIME", 0) => Command::Time,
            ("STOP", 0) => Command::Stop,

            (
                "PING" | "SET" | "SETX" | "GET" | "MGET" | "DEL" | "EXISTS" | "CHECK"
                | "HISTORY" | "KSCAN" | "KEYCUR" | "FLUSH" | "SCAN" | "SCANX" | "RSCAN"
                | "NSNEW" | "NSDEL" | "NSSET" | "NSINFO" | "NSLIST" | "SELECT" | "RELOAD"
                | "AUTH" | "WAIT" | "DBSIZE" | "INFO" | "TIME" | "STOP",
                _,
            ) => {
                return Err(ShelfError::Protocol(format!(
                    "wrong number of arguments for '{}'",
                    name
                )))
            }

            _ => return Err(ShelfError::Protocol(format!("unknown command '{}'", name))),
        };

        Ok(command)
    }

    /// Canonical upper-case name, as matched by WAIT
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Mget { .. } => "MGET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Check { .. } => "CHECK",
            Command::Scan { .. } => "SCAN",
            Command::Rscan { .. } => "RSCAN",
            Command::History { .. } => "HISTORY",
            Command::Kscan { .. } => "KSCAN",
            Command::Keycur { .. } => "KEYCUR",
            Command::Flush => "FLUSH",
            Command::NsNew { .. } => "NSNEW",
            Command::NsDel { .. } => "NSDEL",
            Command::NsSet { .. } => "NSSET",
            Command::NsInfo { .. } => "NSINFO",
            Command::NsList => "NSLIST",
            Command::Select { .. } => "SELECT",
            Command::Reload { .. } => "RELOAD",
            Command::Auth { .. } => "AUTH",
            Command::Wait { .. } => "WAIT",
            Command::DbSize => "DBSIZE",
            Command::Info => "INFO",
            Command::Time => "TIME",
            Command::Stop => "STOP",
        }
    }
}

fn take(mut args: Vec<Vec<u8>>, index: usize) -> Vec<u8> {
    std::mem::take(&mut args[index])
}

fn text(arg: &[u8]) -> Result<String> {
    String::from_utf8(arg.to_vec())
        .map_err(|_| ShelfError::InvalidValue("argument is not valid UTF-8".to_string()))
}

fn parse_u64(arg: &[u8], what: &str) -> Result<u64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ShelfError::InvalidValue(format!("invalid {}", what)))
}
