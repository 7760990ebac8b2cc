//! Provider core
//!
//! Everything here is independent of individual ZIA resource types:
//!
//! - [`error`]: Error type and ZIA error classification
//! - [`retry`]: Retry loop for transient `INVALID_INPUT_ARGUMENT` failures
//! - [`ordering`]: Starting-order cache and rule reordering
//! - [`rule_constraints`]: Order and rank rules shared by every policy
//! - [`state`]: Local state file tracking managed resources

pub mod error;
pub mod ordering;
pub mod retry;
pub mod rule_constraints;
pub mod state;

#[cfg(test)]
pub mod test_helpers;
