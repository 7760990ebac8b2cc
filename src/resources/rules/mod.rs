//! Policy rule resources
//!
//! Every rule kind implements [`PolicyRule`] and is served by the generic
//! [`RuleResource`], which owns the ordering lifecycle:
//!
//! 1. Validate the requested order/rank.
//! 2. Create the rule at the cached starting order of its kind with the
//!    least privileged rank, so the create is valid however many rules
//!    exist. `INVALID_INPUT_ARGUMENT` is retried until the create timeout,
//!    except rank/order conflicts.
//! 3. Register the requested order with the [`RuleOrderer`] and wait for the
//!    reorder step.
//! 4. Read the rule back and mark its order as done.
//!
//! An order past the end of the policy places the rule last. State keeps the
//! configured order while the rule stays last, so the plan settles.
//!
//! [`RuleOrderer`]: crate::core::ordering::RuleOrderer

pub mod bandwidth_control;
pub mod casb_dlp;
pub mod firewall_dns;
pub mod firewall_filtering;
pub mod nat_control;
pub mod traffic_capture;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{DataSource, Resource, lookup, require_id, resolve_import};
use crate::audit::EventType;
use crate::client::services::{ApiObject, ObjectService};
use crate::core::error::{Error, Result};
use crate::core::ordering::{OrderOps, OrderRule};
use crate::core::retry::{RetryPolicy, retry_on_invalid_input};
use crate::core::rule_constraints::{
    DEFAULT_RANK, check_order_rule, clamp_order, creation_rank, order_vs_rank_wording,
};
use crate::provider::{Attribute, Diagnostics, ProviderMeta, ResourceData, Schema};
use crate::validators;

/// Fields every ZIA policy rule carries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleBase {
    #[serde(default, skip_serializing_if = "crate::resources::common::is_zero")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub rank: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing)]
    pub predefined: bool,
    #[serde(default, skip_serializing)]
    pub default_rule: bool,
}

impl RuleBase {
    pub fn from_data(data: &ResourceData) -> Self {
        Self {
            id: data.numeric_id().unwrap_or_default(),
            name: data.get_string("name"),
            description: data.get_string("description"),
            order: data.get_i32("order").unwrap_or_default(),
            rank: data.get_i32("rank").unwrap_or(DEFAULT_RANK),
            state: data.get_str("state").map(str::to_string),
            predefined: false,
            default_rule: false,
        }
    }

    pub fn order_rule(&self) -> OrderRule {
        OrderRule {
            order: self.order,
            rank: self.rank,
        }
    }

    /// Predefined and default rules belong to ZIA.
    pub fn is_managed_by_zia(&self) -> bool {
        self.predefined || self.default_rule
    }

    fn write_state(&self, data: &mut ResourceData) {
        data.set("rule_id", json!(self.id));
        data.set("name", json!(self.name));
        data.set("description", json!(self.description));
        data.set("order", json!(self.order));
        data.set("rank", json!(self.rank));
        data.set("state", json!(self.state));
    }
}

/// Access to the embedded [`RuleBase`]
pub trait HasRuleBase {
    fn base(&self) -> &RuleBase;
    fn base_mut(&mut self) -> &mut RuleBase;
}

/// Implements [`ApiObject`] and [`HasRuleBase`] for a rule struct with a
/// flattened `base: RuleBase` field.
macro_rules! rule_api_object {
    ($ty:ty, $path:literal, $kind:literal) => {
        $crate::resources::rules::rule_api_object!($ty, $path, $kind, None);
    };
    ($ty:ty, $path:literal, $kind:literal, $list_all:expr) => {
        impl $crate::client::services::ApiObject for $ty {
            const PATH: &'static str = $path;
            const KIND: &'static str = $kind;
            const LIST_ALL_PATH: Option<&'static str> = $list_all;

            fn id(&self) -> i64 {
                self.base.id
            }

            fn name(&self) -> &str {
                &self.base.name
            }
        }

        impl $crate::resources::rules::HasRuleBase for $ty {
            fn base(&self) -> &$crate::resources::rules::RuleBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut $crate::resources::rules::RuleBase {
                &mut self.base
            }
        }
    };
}
pub(crate) use rule_api_object;

/// One kind of ZIA policy rule
pub trait PolicyRule: ApiObject + HasRuleBase + Default {
    const TYPE_NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// Key under which the orderer coordinates this kind
    const ORDER_KEY: &'static str;

    /// Attributes beyond the common rule attributes.
    fn attributes() -> Vec<(&'static str, Attribute)>;

    /// Cross-attribute checks.
    fn validate(_data: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }

    /// Builds the API payload from configuration.
    fn expand(data: &ResourceData) -> Result<Self>;

    /// Writes the kind-specific fields to state.
    fn flatten(&self, data: &mut ResourceData);

    /// Orderer key of this rule; kinds with independent orders per
    /// sub-type refine it.
    fn order_kind(&self) -> String {
        Self::ORDER_KEY.to_string()
    }

    /// Query restricting list calls to the rules sharing this rule's order.
    fn list_scope(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Query needed to read a rule, derived from stored state.
    fn scope_of(_data: &ResourceData) -> Vec<(String, String)> {
        Vec::new()
    }
}

fn common_attributes() -> Vec<(&'static str, Attribute)> {
    vec![
        (
            "rule_id",
            Attribute::int().computed().describe("ZIA id of the rule"),
        ),
        (
            "name",
            Attribute::string()
                .required()
                .validate_str(validators::validate_rule_name)
                .describe("Rule name"),
        ),
        (
            "description",
            Attribute::string()
                .validate_str(validators::validate_description)
                .describe("Additional information about the rule"),
        ),
        (
            "order",
            Attribute::int()
                .required()
                .validate_int(validators::validate_order)
                .describe("Evaluation order; clamped to the number of rules"),
        ),
        (
            "rank",
            Attribute::int()
                .default_value(json!(DEFAULT_RANK))
                .validate_int(validators::validate_rank)
                .describe("Admin rank of the rule (0-7)"),
        ),
        (
            "state",
            Attribute::string()
                .optional_computed()
                .validate_str(validators::validate_rule_state)
                .describe("ENABLED or DISABLED"),
        ),
    ]
}

async fn list_rules<R: PolicyRule>(
    service: &ObjectService<R>,
    scope: &[(String, String)],
) -> Result<Vec<R>> {
    if scope.is_empty() {
        service.list().await
    } else {
        service.list_scoped(scope).await
    }
}

fn ordered_count<R: PolicyRule>(rules: &[R]) -> usize {
    rules.iter().filter(|r| r.base().order > 0).count()
}

async fn list_orders<R: PolicyRule>(
    service: &ObjectService<R>,
    scope: &[(String, String)],
) -> Result<Vec<OrderRule>> {
    Ok(list_rules(service, scope)
        .await?
        .iter()
        .map(|r| r.base().order_rule())
        .collect())
}

/// Replaces a raw rank/order rejection with one that shows the current
/// order-vs-rank layout of the policy.
async fn explain_rank_conflict<R: PolicyRule>(
    error: Error,
    service: &ObjectService<R>,
    scope: &[(String, String)],
) -> Error {
    let Some((rank, order)) = error.rank_order_conflict() else {
        return error;
    };
    let layout = match list_orders(service, scope).await {
        Ok(rules) => order_vs_rank_wording(&rules),
        Err(e) => format!("unavailable ({e})"),
    };
    Error::RankOrderConflict {
        message: format!(
            "a rule with rank {rank} is not allowed at order {order}; rules with a lower rank must be ordered first"
        ),
        layout,
    }
}

/// [`OrderOps`] over one rule collection
struct RuleOrderOps<R> {
    service: ObjectService<R>,
    scope: Vec<(String, String)>,
    retry: RetryPolicy,
}

#[async_trait]
impl<R: PolicyRule> OrderOps for RuleOrderOps<R> {
    async fn count(&self) -> Result<usize> {
        Ok(ordered_count(&list_rules(&self.service, &self.scope).await?))
    }

    async fn apply_order(&self, id: i64, order: OrderRule) -> Result<bool> {
        let mut rule = self.service.get_scoped(id, &self.scope).await?;
        if rule.base().order_rule() == order {
            return Ok(false);
        }
        rule.base_mut().order = order.order;
        rule.base_mut().rank = order.rank;

        let operation = format!("reorder {} {id}", R::TYPE_NAME);
        match retry_on_invalid_input(self.retry, &operation, || self.service.update(id, &rule)).await
        {
            Ok(_) => Ok(true),
            Err(e) => Err(explain_rank_conflict(e, &self.service, &self.scope).await),
        }
    }
}

/// Generic resource for every [`PolicyRule`] kind
pub struct RuleResource<R>(PhantomData<fn() -> R>);

impl<R: PolicyRule> Default for RuleResource<R> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<R: PolicyRule> RuleResource<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_schema() -> Schema {
        Schema::new(R::DESCRIPTION)
            .with_all(common_attributes())
            .with_all(R::attributes())
    }

    fn write_state(rule: &R, data: &mut ResourceData) {
        rule.base().write_state(data);
        rule.flatten(data);
    }

    /// Restores `requested` in state when the rule sits where an order past
    /// the end of the policy puts it.
    async fn keep_requested_order(
        service: &ObjectService<R>,
        rule: &R,
        requested: Option<i32>,
        data: &mut ResourceData,
    ) -> Result<()> {
        let actual = rule.base().order;
        let Some(requested) = requested.filter(|&requested| requested > actual) else {
            return Ok(());
        };
        let count = ordered_count(&list_rules(service, &rule.list_scope()).await?);
        if clamp_order(requested, count) == actual {
            debug!(type_name = R::TYPE_NAME, id = rule.id(), requested, actual, "Rule is last, keeping requested order");
            data.set("order", json!(requested));
        }
        Ok(())
    }

    /// Waits for the requested order to be applied, then refreshes `data`.
    async fn reconcile(
        &self,
        meta: &ProviderMeta,
        service: &ObjectService<R>,
        rule: &R,
        desired: OrderRule,
        data: &mut ResourceData,
    ) -> Result<()> {
        let kind = rule.order_kind();
        let ops = RuleOrderOps {
            service: service.clone(),
            scope: rule.list_scope(),
            retry: meta.retry,
        };
        let record_reorder = || {
            meta.record(
                EventType::ReorderRules,
                R::TYPE_NAME,
                None,
                json!({ "kind": kind }),
                None,
            )
        };

        let reordered = meta
            .orderer
            .reorder_with_before_reorder(&kind, rule.id(), desired, &ops, Some(record_reorder))
            .await;
        let result = match reordered {
            Ok(()) => self.read(meta, data).await,
            Err(e) => Err(e),
        };
        meta.orderer.mark_order_rule_as_done(&kind, rule.id()).await;
        result
    }
}

#[async_trait]
impl<R: PolicyRule> Resource for RuleResource<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Self::rule_schema()
    }

    fn validate(&self, data: &ResourceData) -> Diagnostics {
        R::validate(data)
    }

    async fn create(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let mut rule = R::expand(data)?;
        rule.base_mut().id = 0;
        let desired = rule.base().order_rule();
        check_order_rule(desired)?;

        let service = meta.service::<R>();
        let kind = rule.order_kind();
        let scope = rule.list_scope();

        let start = meta
            .orderer
            .starting_order(&kind, || list_orders(&service, &scope))
            .await?;
        rule.base_mut().order = start;
        rule.base_mut().rank = creation_rank(desired.rank);

        let operation = format!("create {}", R::TYPE_NAME);
        let created =
            match retry_on_invalid_input(meta.retry, &operation, || service.create(&rule)).await {
                Ok(created) => created,
                Err(e) => return Err(explain_rank_conflict(e, &service, &scope).await),
            };

        data.set_id(created.id());
        info!(
            type_name = R::TYPE_NAME,
            id = created.id(),
            order = created.base().order,
            requested = desired.order,
            "Created rule"
        );

        self.reconcile(meta, &service, &created, desired, data).await
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let scope = R::scope_of(data);
        let service = meta.service::<R>();
        match service.get_scoped(id, &scope).await {
            Ok(rule) => {
                let requested = data.get_i32("order");
                Self::write_state(&rule, data);
                Self::keep_requested_order(&service, &rule, requested, data).await
            }
            Err(e) if e.is_not_found() => {
                warn!(type_name = R::TYPE_NAME, id, "Rule not found");
                data.clear_id();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn update(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let service = meta.service::<R>();
        let existing = match service.get_scoped(id, &R::scope_of(data)).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                warn!(type_name = R::TYPE_NAME, id, "Rule not found");
                data.clear_id();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if existing.base().is_managed_by_zia() {
            return Err(Error::PredefinedRule(id));
        }

        let mut rule = R::expand(data)?;
        rule.base_mut().id = id;
        let desired = rule.base().order_rule();
        check_order_rule(desired)?;

        // Content changes are written at the current position; the reorder
        // step moves the rule afterwards
        let current = existing.base().order_rule();
        let needs_reorder = current != desired;
        if needs_reorder {
            rule.base_mut().order = current.order;
            rule.base_mut().rank = current.rank;
        }

        let scope = rule.list_scope();
        let operation = format!("update {} {id}", R::TYPE_NAME);
        let updated =
            match retry_on_invalid_input(meta.retry, &operation, || service.update(id, &rule)).await
            {
                Ok(updated) => updated,
                Err(e) => return Err(explain_rank_conflict(e, &service, &scope).await),
            };

        if needs_reorder {
            self.reconcile(meta, &service, &updated, desired, data).await
        } else {
            Self::write_state(&updated, data);
            Ok(())
        }
    }

    async fn delete(&self, meta: &ProviderMeta, data: &ResourceData) -> Result<()> {
        let id = require_id(data)?;
        let service = meta.service::<R>();
        match service.get_scoped(id, &R::scope_of(data)).await {
            Ok(rule) if rule.base().is_managed_by_zia() => return Err(Error::PredefinedRule(id)),
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
        match service.delete(id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    async fn import(&self, meta: &ProviderMeta, id_or_name: &str) -> Result<String> {
        resolve_import(&meta.service::<R>(), id_or_name).await
    }
}

/// Lookup of a rule by id or name
pub struct RuleDataSource<R>(PhantomData<fn() -> R>);

impl<R: PolicyRule> Default for RuleDataSource<R> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<R: PolicyRule> DataSource for RuleDataSource<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn schema(&self) -> Schema {
        RuleResource::<R>::rule_schema().as_data_source()
    }

    async fn read(&self, meta: &ProviderMeta, data: &mut ResourceData) -> Result<()> {
        let rule = lookup(&meta.service::<R>(), data).await?;
        RuleResource::<R>::write_state(&rule, data);
        data.set("id", json!(rule.id()));
        data.set_id(rule.id());
        Ok(())
    }
}

fn rule_resource<R: PolicyRule>() -> Arc<dyn Resource> {
    Arc::new(RuleResource::<R>::new())
}

fn rule_data_source<R: PolicyRule>() -> Arc<dyn DataSource> {
    Arc::new(RuleDataSource::<R>::default())
}

pub fn resources() -> Vec<Arc<dyn Resource>> {
    vec![
        rule_resource::<firewall_filtering::FirewallFilteringRule>(),
        rule_resource::<firewall_dns::FirewallDnsRule>(),
        rule_resource::<nat_control::NatControlRule>(),
        rule_resource::<bandwidth_control::BandwidthControlRule>(),
        rule_resource::<traffic_capture::TrafficCaptureRule>(),
        rule_resource::<casb_dlp::CasbDlpRule>(),
    ]
}

pub fn data_sources() -> Vec<Arc<dyn DataSource>> {
    vec![
        rule_data_source::<firewall_filtering::FirewallFilteringRule>(),
        rule_data_source::<firewall_dns::FirewallDnsRule>(),
        rule_data_source::<nat_control::NatControlRule>(),
        rule_data_source::<bandwidth_control::BandwidthControlRule>(),
        rule_data_source::<traffic_capture::TrafficCaptureRule>(),
        rule_data_source::<casb_dlp::CasbDlpRule>(),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use crate::core::test_helpers::{MemoryBackend, fast_provider};

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Smallest valid configuration of each kind, with its API path
    fn every_kind(order: i64) -> Vec<(&'static str, &'static str, Map<String, Value>)> {
        vec![
            (
                "zia_firewall_filtering_rule",
                "/firewallFilteringRules",
                map(json!({ "name": "filter", "order": order, "action": "ALLOW" })),
            ),
            (
                "zia_firewall_dns_rule",
                "/firewallDnsRules",
                map(json!({ "name": "dns", "order": order, "action": "ALLOW" })),
            ),
            (
                "zia_nat_control_rules",
                "/dnatRules",
                map(json!({ "name": "nat", "order": order, "redirect_ip": "10.0.0.1" })),
            ),
            (
                "zia_bandwidth_control_rule",
                "/bandwidthControlRules",
                map(json!({ "name": "bw", "order": order })),
            ),
            (
                "zia_traffic_capture_rules",
                "/trafficCaptureRules",
                map(json!({ "name": "cap", "order": order, "action": "CAPTURE" })),
            ),
            (
                "zia_casb_dlp_rules",
                "/casbDlpRules",
                map(json!({ "name": "dlp", "order": order, "type": "OFLCASB_DLP_FILE" })),
            ),
        ]
    }

    #[tokio::test]
    async fn test_every_kind_creates_past_the_end_of_an_empty_policy() {
        for (type_name, path, config) in every_kind(5) {
            let backend = Arc::new(MemoryBackend::new());
            let provider = fast_provider(Arc::clone(&backend));

            let data = provider
                .create(type_name, config)
                .await
                .unwrap_or_else(|diags| panic!("{type_name}: {diags}"));

            let id = data.numeric_id().unwrap();
            assert_eq!(backend.orders(path), vec![(id, 1)], "{type_name}");
            assert_eq!(data.get_i64("order"), Some(5), "{type_name}");
        }
    }

    #[tokio::test]
    async fn test_every_kind_creates_past_the_end_of_a_populated_policy() {
        for (type_name, path, config) in every_kind(9) {
            let backend = Arc::new(MemoryBackend::new());
            for id in 1..=3 {
                let mut existing = json!({ "id": id, "name": format!("existing-{id}"), "order": id, "rank": 7 });
                if let Some(rule_type) = config.get("type") {
                    existing["type"] = rule_type.clone();
                }
                backend.seed(path, existing);
            }
            let provider = fast_provider(Arc::clone(&backend));

            let data = provider
                .create(type_name, config)
                .await
                .unwrap_or_else(|diags| panic!("{type_name}: {diags}"));

            let id = data.numeric_id().unwrap();
            assert_eq!(backend.orders(path).last(), Some(&(id, 4)), "{type_name}");
            assert_eq!(data.get_i64("order"), Some(9), "{type_name}");
        }
    }

    #[tokio::test]
    async fn test_refresh_reports_real_order_once_rule_is_no_longer_last() {
        let backend = Arc::new(MemoryBackend::new());
        let provider = fast_provider(Arc::clone(&backend));
        let config = map(json!({ "name": "filter", "order": 5, "action": "ALLOW" }));
        let data = provider
            .create("zia_firewall_filtering_rule", config)
            .await
            .unwrap();
        let id = data.id().unwrap().to_string();

        let values = data.into_values();
        let kept = provider
            .read("zia_firewall_filtering_rule", &id, values.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.get_i64("order"), Some(5));

        backend.seed(
            "/firewallFilteringRules",
            json!({ "id": 1, "name": "later", "order": 2, "rank": 7 }),
        );
        let moved = provider
            .read("zia_firewall_filtering_rule", &id, values)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.get_i64("order"), Some(1));
    }
}
