//! `boxkeeper` provisions, tracks, and reclaims short-lived cloud development boxes.
//!
//! # Overview
//!
//! boxkeeper manages single-VM leases on behalf of multiple users. It handles:
//! - Box creation from named image aliases
//! - Per-owner visibility and mutation scoping
//! - SSH key pair setup for box access
//! - TTL-based reaping of expired boxes
//!
//! # Architecture
//!
//! boxkeeper keeps no database of its own: the compute provider's
//! tagged-instance inventory is the single source of truth, read fresh on
//! every call. The components are:
//!
//! - **Alias**: image alias to boot image id resolution
//! - **Keys**: SSH key material import and reuse
//! - **Inventory**: the read path over tagged instances
//! - **Lifecycle**: owner-scoped create, delete and reboot
//! - **Reaper**: periodic reconciliation terminating expired boxes
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use boxkeeper::{
//!     config::BoxkeeperConfig,
//!     lifecycle::LifecycleController,
//!     provider::RestComputeProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BoxkeeperConfig::load("boxkeeper.yaml").await?;
//!     let provider = Arc::new(RestComputeProvider::new(
//!         config.get_provider_endpoint(),
//!         config.get_provider_token().clone(),
//!     ));
//!
//!     let lifecycle = LifecycleController::new(provider, config);
//!     let boxes = lifecycle.inventory().list_boxes(Some("alice")).await?;
//!     println!("{}", serde_json::to_string_pretty(&boxes)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`alias`] - Image alias resolution
//! - [`config`] - Configuration types and validation
//! - [`inventory`] - Box listings parsed from provider tags
//! - [`keys`] - SSH key material management
//! - [`lifecycle`] - Box creation and owner-scoped mutation
//! - [`provider`] - Compute provider trait and REST client
//! - [`reaper`] - TTL-based reconciliation
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod alias;
pub mod config;
pub mod inventory;
pub mod keys;
pub mod lifecycle;
pub mod provider;
pub mod reaper;
pub mod utils;

pub use error::*;
