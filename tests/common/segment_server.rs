//! Minimal HTTP/1.1 server serving static segments for integration tests.
//!
//! Each path can be told to fail a number of times before it succeeds, and
//! every request is counted per path.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How an injected failure looks to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Respond with this status and an empty body.
    Status(u16),
    /// Close the connection without responding.
    Drop,
}

#[derive(Default)]
struct State {
    bodies: HashMap<String, Vec<u8>>,
    failures: HashMap<String, (Failure, usize)>,
    requests: HashMap<String, usize>,
}

/// Handle to a running server. The server lives until the process exits.
#[derive(Clone)]
pub struct SegmentServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl SegmentServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{port}"),
            state,
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn serve(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .bodies
            .insert(path.to_string(), body.into());
    }

    /// Makes the next `times` requests for `path` fail.
    pub fn fail(&self, path: &str, failure: Failure, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(path.to_string(), (failure, times));
    }

    pub fn requests(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.state.lock().unwrap().requests.values().sum()
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/").to_string();

    let (failure, body) = {
        let mut state = state.lock().unwrap();
        *state.requests.entry(path.clone()).or_default() += 1;
        let failure = match state.failures.get_mut(&path) {
            Some((failure, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*failure)
            }
            _ => None,
        };
        (failure, state.bodies.get(&path).cloned())
    };

    match failure {
        Some(Failure::Drop) => return,
        Some(Failure::Status(code)) => {
            let _ = write!(
                stream,
                "HTTP/1.1 {code} Injected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            return;
        }
        None => {}
    }

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    match body {
        Some(body) => {
            let _ = write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(&body);
        }
        None => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        }
    }
}
