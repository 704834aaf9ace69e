//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body for every GET. Can answer with an error status,
//! omit Content-Length (body ends at connection close), trickle the body in
//! chunks, or stall mid-body to provoke a transfer timeout.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Status line code; anything other than 200 is sent with an empty body.
    pub status: u16,
    /// If false, no Content-Length is sent and the connection closes after the body.
    pub content_length: bool,
    /// Body is written in chunks of this size.
    pub chunk_size: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
    /// Stop writing (but keep the socket open) after this many body bytes.
    pub stall_after: Option<usize>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            status: 200,
            content_length: true,
            chunk_size: 64 * 1024,
            chunk_delay: Duration::ZERO,
            stall_after: None,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the base URL
/// (e.g. "http://127.0.0.1:12345/"). The server runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }

    let body = if opts.status == 200 { body } else { &body[0..0] };
    let mut head = format!("HTTP/1.1 {} {}\r\n", opts.status, reason(opts.status));
    if opts.content_length {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let mut sent = 0usize;
    for chunk in body.chunks(opts.chunk_size.max(1)) {
        if let Some(limit) = opts.stall_after {
            if sent + chunk.len() > limit {
                let _ = stream.write_all(&chunk[..limit - sent]);
                let _ = stream.flush();
                thread::sleep(Duration::from_secs(30));
                return;
            }
        }
        if stream.write_all(chunk).is_err() {
            return;
        }
        let _ = stream.flush();
        sent += chunk.len();
        if !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
}
