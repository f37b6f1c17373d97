//! screenhub Daemon - Screen registry and UI client multiplexer
//!
//! This crate provides the server an emulation core embeds to expose its
//! video outputs to out-of-process UI clients:
//! - `registry` - Screen registry keyed by canvas identity
//! - `clients` - Table of connected UI clients
//! - `listener` - Loopback listening endpoint
//! - `multiplexer` - Zero-timeout readiness polling over all sockets
//! - `server` - Lifecycle controller driven once per emulation tick
//! - `config` - Server configuration (TOML file, environment)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 emulation loop (host thread)                │
//! │        init() ─── tick() per frame ─── shutdown()           │
//! └──────────────────────────────┬──────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          UiServer                           │
//! │                                                             │
//! │  ┌──────────────────┐   rebuild   ┌──────────────────────┐  │
//! │  │   ClientTable    │────────────▶│     Multiplexer      │  │
//! │  │ (connected UIs)  │  when stale │ (poll, zero timeout) │  │
//! │  └────────▲─────────┘             └──────────┬───────────┘  │
//! │           │ add / remove                     │ readiness    │
//! │  ┌────────┴─────────┐             ┌──────────▼───────────┐  │
//! │  │ListeningEndpoint │◀── accept ──│   tick dispatch      │  │
//! │  │ (127.0.0.1:port) │             │ read / evict / accept│  │
//! │  └──────────────────┘             └──────────────────────┘  │
//! │                                                             │
//! │  ┌──────────────────┐                                       │
//! │  │  ScreenRegistry  │  (canvas identity → screen)           │
//! │  └──────────────────┘                                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Per-connection failures evict the client instead of failing the tick

pub mod clients;
pub mod config;
pub mod listener;
pub mod multiplexer;
pub mod registry;
pub mod server;
