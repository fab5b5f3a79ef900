//! Subscription state synchronization for a VLESS proxy.
//!
//! `gatekit-core` grants and withdraws network access for subscribers
//! identified by an external account id. Access lives in two places that must
//! stay coherent:
//!
//! * a durable subscription record ([`storage::SubscriptionStore`], `SQLite`),
//! * the proxy's live access document ([`access::AccessConfigRegistry`], JSON).
//!
//! [`ProvisioningEngine`] orchestrates both. Every read-modify-write of the
//! access document runs under [`storage::AccessLock`], which serializes
//! writers inside the process and across processes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatekit_core::{DeploymentConfig, GateKitError, PlainUriRenderer, ProvisioningEngine};
//!
//! let config = Arc::new(DeploymentConfig::with_root("/var/lib/gatekit"));
//! let engine = ProvisioningEngine::open(config, Arc::new(PlainUriRenderer))?;
//! let response = engine.provision(42, 30, chrono::Utc::now())?;
//! println!("{}", response.connection_uri);
//! # Ok::<(), GateKitError>(())
//! ```
#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod config;
pub use config::*;

mod error;
pub use error::*;

mod engine;
pub use engine::*;

pub mod access;
pub mod logger;
pub mod storage;
