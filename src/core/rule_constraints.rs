//! Order and rank constraints for ZIA policy rules
//!
//! ZIA evaluates policy rules by ascending `order`. Every rule also carries an
//! admin `rank` (0 = most privileged, 7 = default). A rule may never be placed
//! ahead of a rule with a lower rank, which is why the API answers with
//! "Rule with rank N is not allowed at order M" for some layouts.
//!
//! # Examples
//!
//! ```
//! use zia_provider::core::ordering::OrderRule;
//! use zia_provider::core::rule_constraints::*;
//!
//! assert!(check_order_rule(OrderRule { order: 1, rank: 7 }).is_ok());
//! assert!(check_order_rule(OrderRule { order: 0, rank: 7 }).is_err());
//! assert!(check_order_rule(OrderRule { order: 1, rank: 8 }).is_err());
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::error::{Error, Result};
use super::ordering::OrderRule;

/// Most privileged admin rank.
pub const MIN_RANK: i32 = 0;

/// Least privileged admin rank, used when none is configured.
pub const DEFAULT_RANK: i32 = 7;

/// Lowest order a user rule may request.
pub const MIN_ORDER: i32 = 1;

static RANK_ORDER_CONFLICT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Rule with rank ([0-9]+) is not allowed at order ([0-9]+)").ok());

// ═══════════════════════════════════════════════════════════════════════════
// Order/Rank Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if `rank` is a valid admin rank.
#[inline]
pub fn rank_is_valid(rank: i32) -> bool {
    (MIN_RANK..=DEFAULT_RANK).contains(&rank)
}

/// Validates a requested order/rank pair before any API call.
///
/// # Errors
///
/// Returns `Err` if the order is below [`MIN_ORDER`] or the rank is outside
/// `0..=7`.
pub fn check_order_rule(rule: OrderRule) -> Result<()> {
    if rule.order < MIN_ORDER {
        return Err(Error::validation(
            "order",
            format!("order must be >= {MIN_ORDER}, got {}", rule.order),
        ));
    }
    if !rank_is_valid(rule.rank) {
        return Err(Error::validation(
            "rank",
            format!(
                "rank must be between {MIN_RANK} and {DEFAULT_RANK}, got {}",
                rule.rank
            ),
        ));
    }
    Ok(())
}

/// Clamps a desired order to the number of rules in the policy.
///
/// ZIA rejects orders beyond the rule count, so a rule asking for order 50 in
/// a policy of 12 rules lands at order 12.
pub fn clamp_order(order: i32, rule_count: usize) -> i32 {
    let max = i32::try_from(rule_count).unwrap_or(i32::MAX).max(MIN_ORDER);
    order.clamp(MIN_ORDER, max)
}

/// The rank to create a rule at while its final order is not settled yet.
///
/// Creating at the least privileged rank always succeeds at the tail of the
/// policy; the reorder step then restores the requested rank.
pub fn creation_rank(requested: i32) -> i32 {
    requested.max(DEFAULT_RANK)
}

/// Extracts `(rank, order)` from a "Rule with rank N is not allowed at order M"
/// API message.
pub fn parse_rank_order_conflict(message: &str) -> Option<(i32, i32)> {
    let re = RANK_ORDER_CONFLICT.as_ref()?;
    let caps = re.captures(message)?;
    let rank = caps.get(1)?.as_str().parse().ok()?;
    let order = caps.get(2)?.as_str().parse().ok()?;
    Some((rank, order))
}

/// Describes the current order-vs-rank layout of a policy, sorted by order.
///
/// Used to explain a rank/order conflict to the user.
pub fn order_vs_rank_wording(rules: &[OrderRule]) -> String {
    let mut sorted: Vec<OrderRule> = rules.iter().copied().filter(|r| r.order > 0).collect();
    sorted.sort_by_key(|r| (r.order, r.rank));
    sorted
        .iter()
        .map(|r| format!("order {} (rank {})", r.order, r.rank))
        .collect::<Vec<_>>()
        .join(", ")
}
