#![allow(dead_code)]

use ftp_manager::ServerDescriptor;
use ftp_test_common::TestServer;

use std::thread;
use std::time::{Duration, Instant};

/// Descriptor logging into `server` as `user`, rooted at `path`.
pub fn descriptor_at(server: &TestServer, path: &str) -> ServerDescriptor {
    ServerDescriptor::new(&format!("ftp://{}{path}", server.host()), "user", "secret").unwrap()
}

pub fn descriptor(server: &TestServer) -> ServerDescriptor {
    descriptor_at(server, "/")
}

/// Deterministic, non-repeating enough content.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Poll `cond` until it holds, panicking after 10s.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);

    while !cond() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(1));
    }
}
