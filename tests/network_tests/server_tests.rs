//! Tests for the TCP server
//!
//! These tests verify:
//! - Request/reply round trips over a real socket
//! - Command errors keep the connection open
//! - Broken framing closes the connection
//! - Sessions are per connection
//! - STOP ends the accept loop

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use shelfdb::config::Config;
use shelfdb::engine::Engine;
use shelfdb::network::Server;
use shelfdb::protocol::{read_reply, write_request, Reply};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    _temp: TempDir,
    addr: SocketAddr,
    engine: Arc<Engine>,
    thread: Option<JoinHandle<shelfdb::Result<()>>>,
}

impl TestServer {
    fn start() -> Self {
        let temp = TempDir::new().unwrap();
        let config = Config::builder()
            .data_dir(temp.path().join("data"))
            .index_dir(temp.path().join("index"))
            .listen_addr("127.0.0.1:0")
            .build();
        let engine = Arc::new(Engine::open(config.clone()).unwrap());
        let server = Server::bind(config, Arc::clone(&engine)).unwrap();
        let addr = server.local_addr().unwrap();
        let thread = thread::spawn(move || server.run());

        Self {
            _temp: temp,
            addr,
            engine,
            thread: Some(thread),
        }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).unwrap();
        Client {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    fn stop(mut self) {
        self.engine.request_shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.engine.request_shutdown();
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn call(&mut self, args: &[&[u8]]) -> Reply {
        write_request(&mut self.writer, args).unwrap();
        read_reply(&mut self.reader).unwrap()
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.call(&[b"PING"]), Reply::Status("PONG".to_string()));
    server.stop();
}

#[test]
fn test_set_get_over_socket() {
    let server = TestServer::start();
    let mut client = server.connect();

    let payload = [0u8, 1, 2, b'\r', b'\n', 255];
    assert_eq!(client.call(&[b"SET", b"bin", &payload]), Reply::bulk("bin"));
    assert_eq!(client.call(&[b"GET", b"bin"]), Reply::Bulk(payload.to_vec()));
    assert_eq!(client.call(&[b"GET", b"missing"]), Reply::Nil);
    server.stop();
}

#[test]
fn test_errors_keep_connection() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert!(client.call(&[b"FLUSHALL"]).is_error());
    assert!(client.call(&[b"GET"]).is_error());
    assert!(client.call(&[b"DEL", b"ghost"]).is_error());
    assert_eq!(client.call(&[b"PING"]), Reply::Status("PONG".to_string()));
    server.stop();
}

#[test]
fn test_bad_framing_closes_connection() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.writer.write_all(b"PING\r\n").unwrap();
    assert!(read_reply(&mut client.reader).unwrap().is_error());
    assert!(read_reply(&mut client.reader).is_err());
    server.stop();
}

#[test]
fn test_selection_is_per_connection() {
    let server = TestServer::start();
    let mut first = server.connect();
    let mut second = server.connect();

    assert_eq!(first.call(&[b"NSNEW", b"mine"]), Reply::ok());
    assert_eq!(first.call(&[b"SELECT", b"mine"]), Reply::ok());
    first.call(&[b"SET", b"k", b"in-mine"]);

    assert_eq!(second.call(&[b"GET", b"k"]), Reply::Nil);
    server.stop();
}

#[test]
fn test_stop_command_ends_server() {
    let mut server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.call(&[b"STOP"]), Reply::Status("Stopping".to_string()));

    let thread = server.thread.take().unwrap();
    thread.join().unwrap().unwrap();
    assert!(server.engine.is_shutting_down());
}
