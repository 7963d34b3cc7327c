//! cirrid - a host DNS daemon that gives local containers stable names.
//!
//! cirrid answers A queries for a small zone (by default `ona.im`) from an
//! in-memory name table, and points the host's resolver at itself so that
//! names like `data.box1.ona.im` reach the container bridge on this machine.
//!
//! ## Features
//!
//! - Exact and one-level wildcard matching (`x.host.ona.im` → `host.ona.im`'s address)
//! - Addresses from literals, interface names, or the docker bridge gateway
//! - Host entries from configuration, the machine hostname and the workload container
//! - systemd-resolved (Linux) and `/etc/resolver` (macOS) integration
//! - Reload on SIGHUP, graceful shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            cirrid                               │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │ Config, hostname │───▶│   Reconciler     │                  │
//! │  │ workload, probes │    │ (build NameTable)│                  │
//! │  └──────────────────┘    └────────┬─────────┘                  │
//! │                                   │ publish                     │
//! │                                   ▼                             │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │ OS resolver      │◀───│   DNS State      │                  │
//! │  │ (resolved.conf,  │    │   (snapshot)     │                  │
//! │  │  /etc/resolver)  │    └────────┬─────────┘                  │
//! │  └──────────────────┘             ▼                             │
//! │                          ┌──────────────────┐                  │
//! │                          │  ZoneResponder   │◀── UDP/TCP       │
//! │                          │  (hickory)       │    :53           │
//! │                          └──────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! data.box1.ona.im A
//!   → exact key data.box1.ona.im.      (no match)
//!   → wildcard key .box1.ona.im.       (match)
//!   → authoritative A 172.17.0.1, TTL 60
//!
//! anything else → NOERROR, empty, not authoritative
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use cirrid::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load(&cirrid::config::default_path()).unwrap();
//!
//!     let cancel = CancellationToken::new();
//!     let shutdown = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!
//!     DnsServer::new(config).run(cancel).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod platform;
pub mod reconcile;
pub mod responder;
pub mod server;
pub mod state;
pub mod system;
pub mod table;
pub mod telemetry;

// Re-export main types
pub use address::{AddressResolver, AddressSpec, NetworkProbe};
pub use config::{Config, DnsConfig, TelemetryConfig};
pub use domain::DomainKey;
pub use error::DnsError;
pub use reconcile::{HostIdentity, Reconciler};
pub use responder::ZoneResponder;
pub use server::DnsServer;
pub use state::DnsState;
pub use table::NameTable;
