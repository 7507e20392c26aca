//! Tests for Engine and Session
//!
//! These tests verify:
//! - Key commands and their reply shapes
//! - MGET, KSCAN, KEYCUR and the SETX/SCANX aliases
//! - FLUSH access rules
//! - Namespace commands and per-session selection
//! - Admin authentication
//! - WAIT between concurrent sessions
//! - Server-level commands (INFO, TIME, DBSIZE, STOP)

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shelfdb::config::Config;
use shelfdb::engine::{Engine, Session};
use shelfdb::index::{decode_sequential_key, KeyMode};
use shelfdb::protocol::{Command, Reply};
use shelfdb::ShelfError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_engine() -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    (temp_dir, Arc::new(engine))
}

fn setup_admin_engine(password: &str) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path().join("data"))
        .index_dir(temp_dir.path().join("index"))
        .admin_password(password)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, Arc::new(engine))
}

/// Parse and execute one command given as text arguments
fn exec(session: &mut Session, parts: &[&str]) -> shelfdb::Result<Reply> {
    let args = parts.iter().map(|p| p.as_bytes().to_vec()).collect();
    session.execute(Command::parse(args)?)
}

fn ok(session: &mut Session, parts: &[&str]) -> Reply {
    exec(session, parts).unwrap()
}

fn bulk_text(reply: Reply) -> String {
    match reply {
        Reply::Bulk(bytes) => String::from_utf8(bytes).unwrap(),
        other => panic!("expected bulk reply, got {:?}", other),
    }
}

/// Block until `count` sessions wait on the default namespace
fn wait_for_waiters(engine: &Engine, count: usize) {
    let handle = engine.namespaces().get("default").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.watchers().waiting() < count {
        assert!(Instant::now() < deadline, "waiter never registered");
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let _engine = Engine::open_path(temp_dir.path()).unwrap();

    assert!(temp_dir.path().join("data/default/zdb-data-00000").exists());
    assert!(temp_dir.path().join("index/default/zdb-namespace").exists());
    assert!(temp_dir.path().join("index/default/zdb-index-00000").exists());
}

#[test]
fn test_engine_reopen_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Arc::new(Engine::open_path(temp_dir.path()).unwrap());
        let mut session = engine.session().unwrap();
        ok(&mut session, &["SET", "persist", "me"]);
        engine.sync_all().unwrap();
    }

    let engine = Arc::new(Engine::open_path(temp_dir.path()).unwrap());
    let mut session = engine.session().unwrap();
    assert_eq!(ok(&mut session, &["GET", "persist"]), Reply::bulk("me"));
}

#[test]
fn test_session_starts_on_default() {
    let (_temp, engine) = setup_temp_engine();
    let session = engine.session().unwrap();

    assert_eq!(session.namespace().name(), "default");
    assert!(session.namespace().is_writable());
    assert!(session.is_admin());
}

// =============================================================================
// Key Command Tests
// =============================================================================

#[test]
fn test_ping() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert_eq!(ok(&mut session, &["PING"]), Reply::Status("PONG".to_string()));
}

#[test]
fn test_set_get_del() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert_eq!(ok(&mut session, &["SET", "hello", "world"]), Reply::bulk("hello"));
    assert_eq!(ok(&mut session, &["GET", "hello"]), Reply::bulk("world"));
    assert_eq!(ok(&mut session, &["EXISTS", "hello"]), Reply::Integer(1));
    assert_eq!(ok(&mut session, &["CHECK", "hello"]), Reply::Integer(1));

    assert_eq!(ok(&mut session, &["DEL", "hello"]), Reply::ok());
    assert_eq!(ok(&mut session, &["GET", "hello"]), Reply::Nil);
    assert_eq!(ok(&mut session, &["EXISTS", "hello"]), Reply::Integer(0));
    assert_eq!(ok(&mut session, &["CHECK", "hello"]), Reply::Nil);
}

#[test]
fn test_del_missing_key() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert!(matches!(
        exec(&mut session, &["DEL", "ghost"]),
        Err(ShelfError::KeyNotFound)
    ));
}

#[test]
fn test_unchanged_set_replies_nil() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "k", "v"]);
    assert_eq!(ok(&mut session, &["SET", "k", "v"]), Reply::Nil);
    assert_eq!(ok(&mut session, &["SET", "k", "w"]), Reply::bulk("k"));
}

#[test]
fn test_scan_reply_shape() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "first", "12345"]);
    ok(&mut session, &["SET", "second", "xy"]);

    match ok(&mut session, &["SCAN"]) {
        Reply::Array(parts) => {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0], Reply::bulk("first"));
            match &parts[1] {
                Reply::Array(items) => match &items[0] {
                    Reply::Array(fields) => {
                        assert_eq!(fields[0], Reply::bulk("first"));
                        assert_eq!(fields[1], Reply::Integer(5));
                        assert!(matches!(fields[2], Reply::Integer(_)));
                    }
                    other => panic!("unexpected item {:?}", other),
                },
                other => panic!("unexpected items {:?}", other),
            }
        }
        other => panic!("unexpected scan reply {:?}", other),
    }
}

#[test]
fn test_scan_walks_keyspace() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    for key in ["a", "b", "c"] {
        ok(&mut session, &["SET", key, "v"]);
    }

    let cursor_of = |reply: Reply| match reply {
        Reply::Array(parts) => bulk_text(parts[0].clone()),
        other => panic!("unexpected scan reply {:?}", other),
    };

    assert_eq!(cursor_of(ok(&mut session, &["SCAN", "a"])), "b");
    assert_eq!(cursor_of(ok(&mut session, &["RSCAN"])), "c");
    assert_eq!(cursor_of(ok(&mut session, &["RSCAN", "b"])), "a");
    assert!(matches!(
        exec(&mut session, &["SCAN", "c"]),
        Err(ShelfError::KeyNotFound)
    ));
}

#[test]
fn test_history_reply() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "k", "v1", "100"]);
    ok(&mut session, &["SET", "k", "v2", "200"]);

    assert_eq!(
        ok(&mut session, &["HISTORY", "k"]),
        Reply::Array(vec![
            Reply::Array(vec![Reply::Integer(200), Reply::bulk("v2")]),
            Reply::Array(vec![Reply::Integer(100), Reply::bulk("v1")]),
        ])
    );
}

#[test]
fn test_dbsize() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "a", "1"]);
    ok(&mut session, &["SET", "b", "2"]);
    ok(&mut session, &["DEL", "a"]);

    assert_eq!(ok(&mut session, &["DBSIZE"]), Reply::Integer(1));
}

#[test]
fn test_sequential_namespace_set() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["NSNEW", "seq", "seq"]);
    ok(&mut session, &["SELECT", "seq"]);

    let key = match ok(&mut session, &["SET", "value"]) {
        Reply::Bulk(key) => key,
        other => panic!("unexpected reply {:?}", other),
    };
    assert_eq!(decode_sequential_key(&key), Some(0));
    assert_eq!(engine.namespaces().info("seq").unwrap().mode, KeyMode::Sequential);
}

#[test]
fn test_mget() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "a", "1"]);
    ok(&mut session, &["SET", "b", "2"]);

    assert_eq!(
        ok(&mut session, &["MGET", "a", "missing", "b"]),
        Reply::Array(vec![Reply::bulk("1"), Reply::Nil, Reply::bulk("2")])
    );
}

#[test]
fn test_setx_and_scanx_aliases() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert_eq!(ok(&mut session, &["SETX", "k", "v"]), Reply::bulk("k"));
    assert_eq!(ok(&mut session, &["SCANX"]), ok(&mut session, &["SCAN"]));
}

#[test]
fn test_kscan_prefix() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "user:1", "a"]);
    ok(&mut session, &["SET", "other", "b"]);
    ok(&mut session, &["SET", "user:2", "c"]);

    assert_eq!(
        ok(&mut session, &["KSCAN", "user:"]),
        Reply::Array(vec![
            Reply::bulk("0"),
            Reply::Array(vec![Reply::bulk("user:1"), Reply::bulk("user:2")]),
        ])
    );
    assert!(matches!(
        exec(&mut session, &["KSCAN", "nobody"]),
        Err(ShelfError::KeyNotFound)
    ));

    ok(&mut session, &["NSNEW", "seq", "seq"]);
    ok(&mut session, &["SELECT", "seq"]);
    assert!(matches!(
        exec(&mut session, &["KSCAN", "user:"]),
        Err(ShelfError::InvalidValue(_))
    ));
}

#[test]
fn test_keycur() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "a", "1"]);
    ok(&mut session, &["SET", "b", "2"]);

    let cursor = bulk_text(ok(&mut session, &["KEYCUR", "a"]));
    match ok(&mut session, &["SCAN", cursor.as_str()]) {
        Reply::Array(parts) => assert_eq!(parts[0], Reply::bulk("b")),
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(matches!(
        exec(&mut session, &["KEYCUR", "missing"]),
        Err(ShelfError::KeyNotFound)
    ));
}

#[test]
fn test_flush() {
    let (temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();
    ok(&mut session, &["NSNEW", "vault"]);
    ok(&mut session, &["NSSET", "vault", "public", "0"]);
    ok(&mut session, &["NSSET", "vault", "password", "pw"]);
    ok(&mut session, &["SELECT", "vault", "pw"]);
    ok(&mut session, &["SET", "a", "1"]);
    ok(&mut session, &["SET", "b", "2"]);

    assert_eq!(ok(&mut session, &["FLUSH"]), Reply::ok());
    assert_eq!(ok(&mut session, &["DBSIZE"]), Reply::Integer(0));
    assert_eq!(ok(&mut session, &["GET", "a"]), Reply::Nil);

    // Settings survive, the files start over
    let info = engine.namespaces().info("vault").unwrap();
    assert!(info.protected);
    assert!(!info.public);
    assert_eq!(info.data_size_bytes, 0);
    assert!(temp.path().join("data/vault/zdb-data-00000").exists());
    assert!(temp.path().join("index/vault/zdb-index-00000").exists());

    assert_eq!(ok(&mut session, &["SET", "c", "3"]), Reply::bulk("c"));
    assert_eq!(ok(&mut session, &["GET", "c"]), Reply::bulk("3"));
}

#[test]
fn test_flush_public_namespace_denied() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();
    ok(&mut session, &["SET", "a", "1"]);

    assert!(matches!(
        exec(&mut session, &["FLUSH"]),
        Err(ShelfError::Forbidden(_))
    ));
    assert_eq!(ok(&mut session, &["DBSIZE"]), Reply::Integer(1));
}

// =============================================================================
// Namespace Command Tests
// =============================================================================

#[test]
fn test_namespace_isolation() {
    let (_temp, engine) = setup_temp_engine();
    let mut one = engine.session().unwrap();
    let mut two = engine.session().unwrap();

    ok(&mut one, &["NSNEW", "other"]);
    ok(&mut one, &["SET", "key", "in-default"]);
    ok(&mut two, &["SELECT", "other"]);

    assert_eq!(ok(&mut two, &["GET", "key"]), Reply::Nil);
    ok(&mut two, &["SET", "key", "in-other"]);
    assert_eq!(ok(&mut one, &["GET", "key"]), Reply::bulk("in-default"));
}

#[test]
fn test_nslist() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["NSNEW", "zeta"]);
    ok(&mut session, &["NSNEW", "alpha"]);

    assert_eq!(
        ok(&mut session, &["NSLIST"]),
        Reply::Array(vec![
            Reply::bulk("alpha"),
            Reply::bulk("default"),
            Reply::bulk("zeta"),
        ])
    );
}

#[test]
fn test_nsinfo() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["NSNEW", "info"]);
    ok(&mut session, &["NSSET", "info", "maxsize", "2048"]);
    ok(&mut session, &["NSSET", "info", "password", "pw"]);
    ok(&mut session, &["SELECT", "info", "pw"]);
    ok(&mut session, &["SET", "k", "12345"]);

    let text = bulk_text(ok(&mut session, &["NSINFO", "info"]));
    assert!(text.contains("name: info"));
    assert!(text.contains("entries: 1"));
    assert!(text.contains("password: yes"));
    assert!(text.contains("data_size_bytes: 5"));
    assert!(text.contains("data_limits_bytes: 2048"));
    assert!(text.contains("mode: userkey"));
    assert!(text.contains("clients: 1"));
}

#[test]
fn test_select_read_only() {
    let (_temp, engine) = setup_temp_engine();
    let mut admin = engine.session().unwrap();
    ok(&mut admin, &["NSNEW", "guarded"]);
    ok(&mut admin, &["NSSET", "guarded", "password", "helloworld"]);

    let mut guest = engine.session().unwrap();
    assert!(matches!(
        exec(&mut guest, &["SELECT", "guarded", "hellowo"]),
        Err(ShelfError::AuthFailed)
    ));

    ok(&mut guest, &["SELECT", "guarded"]);
    assert!(!guest.namespace().is_writable());
    assert!(matches!(
        exec(&mut guest, &["SET", "k", "v"]),
        Err(ShelfError::Forbidden(_))
    ));

    ok(&mut guest, &["SELECT", "guarded", "helloworld"]);
    assert_eq!(ok(&mut guest, &["SET", "k", "v"]), Reply::bulk("k"));
}

#[test]
fn test_failed_select_keeps_namespace() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert!(exec(&mut session, &["SELECT", "missing"]).is_err());
    assert_eq!(session.namespace().name(), "default");
}

#[test]
fn test_nsdel_in_use() {
    let (_temp, engine) = setup_temp_engine();
    let mut admin = engine.session().unwrap();
    let mut user = engine.session().unwrap();

    ok(&mut admin, &["NSNEW", "shared"]);
    ok(&mut user, &["SELECT", "shared"]);

    assert!(matches!(
        exec(&mut admin, &["NSDEL", "shared"]),
        Err(ShelfError::InUse(_))
    ));

    ok(&mut user, &["SELECT", "default"]);
    assert_eq!(ok(&mut admin, &["NSDEL", "shared"]), Reply::ok());
}

#[test]
fn test_reload_command() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["SET", "k", "v"]);
    assert_eq!(ok(&mut session, &["RELOAD", "default"]), Reply::ok());
    assert_eq!(ok(&mut session, &["GET", "k"]), Reply::bulk("v"));
}

// =============================================================================
// Admin Tests
// =============================================================================

#[test]
fn test_admin_commands_require_auth() {
    let (_temp, engine) = setup_admin_engine("secret");
    let mut session = engine.session().unwrap();
    assert!(!session.is_admin());

    assert!(matches!(
        exec(&mut session, &["NSNEW", "x"]),
        Err(ShelfError::Forbidden(_))
    ));
    assert!(matches!(
        exec(&mut session, &["SET", "k", "v", "100"]),
        Err(ShelfError::Forbidden(_))
    ));
    assert!(matches!(
        exec(&mut session, &["AUTH", "wrong"]),
        Err(ShelfError::AuthFailed)
    ));

    assert_eq!(ok(&mut session, &["AUTH", "secret"]), Reply::ok());
    assert!(session.is_admin());
    assert_eq!(ok(&mut session, &["NSNEW", "x"]), Reply::ok());
    assert_eq!(ok(&mut session, &["SET", "k", "v", "100"]), Reply::bulk("k"));
}

#[test]
fn test_plain_commands_need_no_auth() {
    let (_temp, engine) = setup_admin_engine("secret");
    let mut session = engine.session().unwrap();

    assert_eq!(ok(&mut session, &["SET", "k", "v"]), Reply::bulk("k"));
    assert_eq!(ok(&mut session, &["GET", "k"]), Reply::bulk("v"));
}

#[test]
fn test_auth_without_admin_password() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert!(matches!(
        exec(&mut session, &["AUTH", "anything"]),
        Err(ShelfError::Forbidden(_))
    ));
}

// =============================================================================
// WAIT Tests
// =============================================================================

#[test]
fn test_wait_fires_on_command() {
    let (_temp, engine) = setup_temp_engine();
    let mut waiter = engine.session().unwrap();
    let mut writer = engine.session().unwrap();

    let handle = thread::spawn(move || exec(&mut waiter, &["WAIT", "SET", "5000"]));

    wait_for_waiters(&engine, 1);
    ok(&mut writer, &["SET", "k", "v"]);

    let reply = handle.join().unwrap().unwrap();
    assert_eq!(reply, Reply::Status("SET".to_string()));
}

#[test]
fn test_wait_any_command() {
    let (_temp, engine) = setup_temp_engine();
    let mut waiter = engine.session().unwrap();
    let mut other = engine.session().unwrap();

    let handle = thread::spawn(move || exec(&mut waiter, &["WAIT", "*"]));

    wait_for_waiters(&engine, 1);
    ok(&mut other, &["PING"]);

    assert_eq!(
        handle.join().unwrap().unwrap(),
        Reply::Status("PING".to_string())
    );
}

#[test]
fn test_wait_ignores_other_namespaces() {
    let (_temp, engine) = setup_temp_engine();
    let mut waiter = engine.session().unwrap();
    let mut other = engine.session().unwrap();
    ok(&mut other, &["NSNEW", "elsewhere"]);
    ok(&mut other, &["SELECT", "elsewhere"]);

    let handle = thread::spawn(move || exec(&mut waiter, &["WAIT", "SET", "300"]));

    wait_for_waiters(&engine, 1);
    ok(&mut other, &["SET", "k", "v"]);

    assert!(matches!(
        handle.join().unwrap(),
        Err(ShelfError::Timeout(_))
    ));
}

#[test]
fn test_wait_select_fires_in_namespace_left() {
    let (_temp, engine) = setup_temp_engine();
    let mut waiter = engine.session().unwrap();
    let mut other = engine.session().unwrap();
    ok(&mut other, &["NSNEW", "elsewhere"]);

    let handle = thread::spawn(move || exec(&mut waiter, &["WAIT", "SELECT", "5000"]));

    wait_for_waiters(&engine, 1);
    ok(&mut other, &["SELECT", "elsewhere"]);

    assert_eq!(
        handle.join().unwrap().unwrap(),
        Reply::Status("SELECT".to_string())
    );
}

#[test]
fn test_wait_timeout() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    let start = Instant::now();
    assert!(matches!(
        exec(&mut session, &["WAIT", "DEL", "100"]),
        Err(ShelfError::Timeout(_))
    ));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_wait_timeout_range() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert!(matches!(
        exec(&mut session, &["WAIT", "SET", "99"]),
        Err(ShelfError::InvalidValue(_))
    ));
    assert!(matches!(
        exec(&mut session, &["WAIT", "SET", "1800001"]),
        Err(ShelfError::InvalidValue(_))
    ));
}

// =============================================================================
// Server Command Tests
// =============================================================================

#[test]
fn test_time() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    match ok(&mut session, &["TIME"]) {
        Reply::Array(parts) => {
            assert_eq!(parts.len(), 2);
            let secs: u64 = bulk_text(parts[0].clone()).parse().unwrap();
            let micros: u64 = bulk_text(parts[1].clone()).parse().unwrap();
            assert!(secs > 1_600_000_000);
            assert!(micros < 1_000_000);
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[test]
fn test_info_and_stats() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    ok(&mut session, &["PING"]);
    ok(&mut session, &["PING"]);

    let text = bulk_text(ok(&mut session, &["INFO"]));
    assert!(text.contains("# server"));
    // INFO counts itself
    assert!(text.contains("commands_executed: 3"));
    assert!(text.contains("namespaces: 1"));
}

#[test]
fn test_stop_requests_shutdown() {
    let (_temp, engine) = setup_temp_engine();
    let mut session = engine.session().unwrap();

    assert!(!engine.is_shutting_down());
    assert_eq!(ok(&mut session, &["STOP"]), Reply::Status("Stopping".to_string()));
    assert!(engine.is_shutting_down());
}

#[test]
fn test_concurrent_sessions_write() {
    let (_temp, engine) = setup_temp_engine();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut session = engine.session().unwrap();
                for i in 0..50 {
                    let key = format!("t{}-k{}", t, i);
                    ok(&mut session, &["SET", key.as_str(), "value"]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut session = engine.session().unwrap();
    assert_eq!(ok(&mut session, &["DBSIZE"]), Reply::Integer(200));
}
