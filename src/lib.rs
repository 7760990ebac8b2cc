//! ZIA provider - Zscaler Internet Access resources for Terraform
//!
//! Manages ZIA policy rules and the objects they reference, keeping rule
//! order consistent while many resources are applied at once.
//!
//! # Architecture
//!
//! - [`core`] - Errors, retry, rule ordering and local state
//! - [`client`] - Authenticated ZIA REST client
//! - [`provider`] - Provider schema, configuration and CRUD dispatch
//! - [`resources`] - Resource and data source implementations
//! - [`driver`] - Manifest-driven apply used by the CLI
//! - [`audit`] - Audit log of every change made through the provider
//! - [`validators`] - Enum and value validators
//! - [`config`] - Provider settings from file and environment
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Ordering guarantees
//!
//! - Rules created in one run are placed by a single reorder pass per policy
//! - `INVALID_INPUT_ARGUMENT` responses are retried every 10 seconds until the timeout
//! - Rank and order conflicts fail with the current policy layout
//! - Objects deleted outside the provider are dropped from state

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod client;
pub mod config;
pub mod core;
pub mod driver;
pub mod provider;
pub mod resources;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use provider::{Diagnostics, Provider};
