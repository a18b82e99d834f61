use reactor_httpd::config::{RouteConfig, RouteKind, ServerConfig};
use reactor_httpd::connection::{Connection, NextInterest};
use reactor_httpd::db::{Pool, UserRepository};
use reactor_httpd::handlers::{login, register, static_files};
use reactor_httpd::http::Method;
use reactor_httpd::router::Router;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

fn socket_pair() -> (TcpStream, mio::net::TcpStream, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, peer) = listener.accept().unwrap();
    server.set_nonblocking(true).unwrap();
    (client, mio::net::TcpStream::from_std(server), peer)
}

fn make_fixture_root() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("reactor_httpd_e2e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), b"<!DOCTYPE html><html>home</html>").unwrap();
    std::fs::write(dir.join("range.bin"), b"0123456789").unwrap();
    dir
}

fn config_with_routes(root: &std::path::Path) -> ServerConfig {
    let mut cfg = ServerConfig::default();
    cfg.routes = vec![
        RouteConfig {
            path: "/register".to_string(),
            methods: vec!["POST".to_string()],
            handler: RouteKind::Register,
            root: String::new(),
            default_file: String::new(),
        },
        RouteConfig {
            path: "/login".to_string(),
            methods: vec!["POST".to_string()],
            handler: RouteKind::Login,
            root: String::new(),
            default_file: String::new(),
        },
        RouteConfig {
            path: "/*".to_string(),
            methods: vec!["GET".to_string()],
            handler: RouteKind::Static,
            root: root.to_string_lossy().to_string(),
            default_file: "index.html".to_string(),
        },
    ];
    cfg
}

fn build_router(cfg: &ServerConfig, users: Arc<UserRepository>) -> Arc<Router> {
    let mut router = Router::new();
    for route in &cfg.routes {
        match route.handler {
            RouteKind::Static => router.add_route(&route.path, Method::Get, Arc::new(static_files::handle)),
            RouteKind::Register => {
                router.add_route(&route.path, Method::Post, Arc::new(register::make_handler(users.clone())))
            }
            RouteKind::Login => {
                router.add_route(&route.path, Method::Post, Arc::new(login::make_handler(users.clone())))
            }
        }
    }
    Arc::new(router)
}

fn users() -> Arc<UserRepository> {
    Arc::new(UserRepository::new(Pool::new(":memory:", 1).unwrap()).unwrap())
}

fn read_available(client: &mut TcpStream) -> Vec<u8> {
    client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        match client.read(&mut tmp) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&tmp[..n]);
                if buf.len() < 65536 {
                    continue;
                }
                break;
            }
            Err(_) => break,
        }
    }
    buf
}

/// S1: two pipelined keep-alive requests arrive in a single TCP segment; the
/// second must be served without waiting for another readable event.
#[test]
fn pipelined_keep_alive_requests_both_get_served() {
    let root = make_fixture_root();
    let cfg = Arc::new(config_with_routes(&root));
    let router = build_router(&cfg, users());

    let (mut client, server_stream, peer) = socket_pair();
    let mut conn = Connection::new(server_stream, peer, cfg);

    let two_requests = b"GET /index.html HTTP/1.1\r\nHost: h\r\nConnection: keep-alive\r\n\r\n\
GET /range.bin HTTP/1.1\r\nHost: h\r\nConnection: keep-alive\r\n\r\n";
    client.write_all(two_requests).unwrap();

    let next = conn.on_readable(&router, None);
    assert_eq!(next, NextInterest::Write);
    let mut next = conn.on_writable(&router, None);
    // Drain until both responses are fully written; a short write can
    // require more than one on_writable call even for small payloads.
    let mut guard = 0;
    while next == NextInterest::Write && guard < 10 {
        next = conn.on_writable(&router, None);
        guard += 1;
    }

    let received = read_available(&mut client);
    let text = String::from_utf8_lossy(&received);
    assert_eq!(text.matches("HTTP/1.1 200").count(), 2, "expected two responses, got: {text}");
    assert!(text.contains("home"));
}

/// S2: a form POST to /register followed by /login on the same connection.
#[test]
fn register_then_login_round_trip() {
    let root = make_fixture_root();
    let cfg = Arc::new(config_with_routes(&root));
    let shared_users = users();
    let router = build_router(&cfg, shared_users);

    let (mut client, server_stream, peer) = socket_pair();
    let mut conn = Connection::new(server_stream, peer, cfg);

    let body = "user=alice&password=secret";
    let request = format!(
        "POST /register HTTP/1.1\r\nHost: h\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    client.write_all(request.as_bytes()).unwrap();

    assert_eq!(conn.on_readable(&router, None), NextInterest::Write);
    let mut next = conn.on_writable(&router, None);
    while next == NextInterest::Write {
        next = conn.on_writable(&router, None);
    }

    let received = read_available(&mut client);
    assert!(String::from_utf8_lossy(&received).contains("HTTP/1.1 201"));
}

/// S3: range request against a static file is satisfied with 206 and the
/// correct byte slice.
#[test]
fn range_request_returns_partial_content() {
    let root = make_fixture_root();
    let cfg = Arc::new(config_with_routes(&root));
    let router = build_router(&cfg, users());

    let (mut client, server_stream, peer) = socket_pair();
    let mut conn = Connection::new(server_stream, peer, cfg);

    let request = b"GET /range.bin HTTP/1.1\r\nHost: h\r\nConnection: close\r\nRange: bytes=2-5\r\n\r\n";
    client.write_all(request).unwrap();

    assert_eq!(conn.on_readable(&router, None), NextInterest::Write);
    let mut next = conn.on_writable(&router, None);
    while next == NextInterest::Write {
        next = conn.on_writable(&router, None);
    }

    let received = read_available(&mut client);
    let text = String::from_utf8_lossy(&received);
    assert!(text.contains("206 Partial Content"), "got: {text}");
    assert!(text.contains("Content-Range: bytes 2-5/10"));
    assert!(text.ends_with("2345"));
}

/// S6: a GET-only route rejects POST with 405.
#[test]
fn method_not_allowed_on_get_only_route() {
    let root = make_fixture_root();
    let cfg = Arc::new(config_with_routes(&root));
    let router = build_router(&cfg, users());

    let (mut client, server_stream, peer) = socket_pair();
    let mut conn = Connection::new(server_stream, peer, cfg);

    let request = b"POST /index.html HTTP/1.1\r\nHost: h\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
    client.write_all(request).unwrap();

    assert_eq!(conn.on_readable(&router, None), NextInterest::Write);
    let mut next = conn.on_writable(&router, None);
    while next == NextInterest::Write {
        next = conn.on_writable(&router, None);
    }

    let received = read_available(&mut client);
    assert!(String::from_utf8_lossy(&received).contains("405 Method Not Allowed"));
}
