//! Socket and connection management.
//!
//! Mirrors Chromium's `net/socket/`:
//! - [`pool`]: per-origin HTTP/1 connection pool (6 per origin) with a FIFO wait queue
//! - [`connectjob`]: DNS → TCP connection flow
//! - [`tls`]: TLS with ALPN over BoringSSL
//! - [`stream`]: type-erased sockets

pub mod connectjob;
pub mod pool;
pub mod stream;
pub mod tls;
