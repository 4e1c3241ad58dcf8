//! Infrastructure Adapters
//!
//! Implementations of the [`RemoteSession`](crate::domain::RemoteSession)
//! port, following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                 Ports (Traits): RemoteSession               │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │        VimJsonSession (vCenter)  │  InMemorySession         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use vsphere_exporter::adapters::{VimJsonConfig, VimJsonSession};
//! use vsphere_exporter::domain::RemoteSession;
//!
//! let session = VimJsonSession::connect(VimJsonConfig::default()).await?;
//! let counters = session.list_performance_counters().await?;
//! ```

mod in_memory;
mod vim_json;

pub use in_memory::InMemorySession;
pub use vim_json::{VimJsonConfig, VimJsonSession};
