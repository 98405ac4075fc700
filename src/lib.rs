//! # fetchnet
//!
//! A Chromium-inspired HTTP client for Rust that negotiates HTTP/1.1 and
//! HTTP/2 per origin and shares transports across requests.
//!
//! ## Features
//!
//! - **Connection Pooling**: 6 HTTP/1 connections per origin (Chromium-compatible), FIFO wait queue
//! - **HTTP/2 Sessions**: one session per origin, GOAWAY handling with stale-session draining
//! - **ALPN**: `https:` origins settle on `h2` or `http/1.1` during the TLS handshake
//! - **Prior knowledge**: `http2://` forces plaintext HTTP/2, `http1://` forces HTTP/1.1
//! - **Server Push**: pushed streams delivered to a client-wide handler
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fetchnet::Client;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new();
//!     let response = client.get("https://example.com").send().await.unwrap();
//!     println!("Status: {} over {:?}", response.status(), response.version());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core types and error definitions
//! - [`config`] - Client configuration, per-origin settings
//! - [`http`] - Transport selection, HTTP/1 connections, request and response types
//! - [`session`] - HTTP/2 session registry, transport and server push
//! - [`socket`] - HTTP/1 connection pool, TCP and TLS connects

pub mod base;
pub mod client;
pub mod config;
pub mod http;
pub mod session;
pub mod socket;

pub use base::neterror::{ErrorKind, NetError};
pub use base::origin::Origin;
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use config::{ContextConfig, HttpProtocol, PerOrigin};
pub use crate::http::HttpResponse;
