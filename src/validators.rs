//! Input validation for provider attributes
//!
//! Enum validators mirror the values documented for the ZIA API; scalar
//! validators enforce length and range limits before any API call is made.
//! Every validator returns `Err(message)` with a message suitable for a
//! Terraform diagnostic.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;
use strum::VariantNames;

use crate::core::rule_constraints::{DEFAULT_RANK, MIN_ORDER, MIN_RANK};

/// Checks `value` against the serialized names of enum `E`.
fn one_of<E>(field: &str, value: &str) -> Result<(), String>
where
    E: FromStr + VariantNames,
{
    if E::from_str(value).is_ok() {
        Ok(())
    } else {
        Err(format!(
            "invalid {field} '{value}', expected one of: {}",
            E::VARIANTS.join(", ")
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Vendor Enums
// ═══════════════════════════════════════════════════════════════════════════

/// Policy rule state
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleState {
    Enabled,
    Disabled,
}

/// Firewall filtering rule actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FirewallAction {
    Allow,
    BlockDrop,
    BlockReset,
    BlockIcmp,
    EvalNwapp,
}

/// Firewall DNS rule actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsAction {
    Allow,
    Block,
    RedirReq,
    RedirRes,
    RedirZpa,
    RedirReqDoh,
    RedirReqKeepSender,
    RedirReqTcp,
    RedirReqUdp,
    BlockWithResponse,
}

impl DnsAction {
    /// Actions that require `redirect_ip`.
    pub fn needs_redirect_ip(self) -> bool {
        matches!(
            self,
            Self::RedirReq
                | Self::RedirRes
                | Self::RedirReqDoh
                | Self::RedirReqKeepSender
                | Self::RedirReqTcp
                | Self::RedirReqUdp
        )
    }
}

/// DNS response codes returned for blocked requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsBlockResponseCode {
    Any,
    None,
    Formerr,
    Servfail,
    Nxdomain,
    Notimp,
    Refused,
    Yxdomain,
    Yxrrset,
    Nxrrset,
    Notauth,
    Notzone,
    Badvers,
    Badkey,
    Badtime,
    Badmode,
    Badname,
    Badalg,
    Badtrunc,
    Badcookie,
}

/// Protocols matched by firewall DNS rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsProtocol {
    AnyRule,
    SmrulefCascadingAllowed,
    TcpRule,
    UdpRule,
    DohttpsRule,
}

/// Protocols matched by bandwidth control rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BandwidthProtocol {
    AnyRule,
    TcpRule,
    UdpRule,
    DohttpsRule,
    TunnelsslRule,
    HttpProxy,
    FohttpRule,
    FtpRule,
    HttpsRule,
    HttpRule,
    SslRule,
    TunnelRule,
}

/// Traffic capture rule actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficCaptureAction {
    Capture,
    Skip,
}

/// Per-transaction capture size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnSizeLimit {
    None,
    Unlimited,
    ThirtyTwoKb,
    TwoFiftySixKb,
    TwoMb,
    FourMb,
    ThirtyTwoMb,
    SixtyFourMb,
}

/// Transaction sampling rates for traffic capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnSampling {
    None,
    OnePercent,
    TwoPercent,
    FivePercent,
    TenPercent,
    TwentyFivePercent,
    HundredPercent,
}

/// SaaS security (CASB DLP) rule types; each type has its own rule order
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CasbRuleType {
    OflcasbDlpFile,
    OflcasbDlpEmail,
    OflcasbDlpCrm,
    OflcasbDlpItsm,
    OflcasbDlpCollab,
    OflcasbDlpRepo,
    OflcasbDlpStorage,
    OflcasbDlpGenai,
}

/// SaaS security (CASB DLP) rule actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CasbAction {
    OflcasbDlpReportIncident,
    OflcasbDlpShareReadOnly,
    OflcasbDlpExternalShareRemove,
    OflcasbDlpInternalShareRemove,
    OflcasbDlpCollabRevokeReadOnly,
    OflcasbDlpRemove,
    OflcasbDlpQuarantine,
    OflcasbDlpApplyMipTag,
    OflcasbDlpApplyBoxTag,
    OflcasbDlpCrmQuarantine,
}

/// Incident severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    RuleSeverityHigh,
    RuleSeverityMedium,
    RuleSeverityLow,
    RuleSeverityInfo,
}

/// Sharing scopes matched by SaaS security rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CollaborationScope {
    Any,
    CollaborationScopeExternalCollabView,
    CollaborationScopeExternalCollabEdit,
    CollaborationScopeExternalLinkView,
    CollaborationScopeExternalLinkEdit,
    CollaborationScopeInternalCollabView,
    CollaborationScopeInternalCollabEdit,
    CollaborationScopeInternalLinkView,
    CollaborationScopeInternalLinkEdit,
    CollaborationScopePrivateEdit,
    CollaborationScopePrivate,
}

/// Device posture trust levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceTrustLevel {
    Any,
    UnknownDevicetrustlevel,
    LowTrust,
    MediumTrust,
    HighTrust,
}

/// IP destination group types
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::VariantNames, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationGroupType {
    DstnIp,
    DstnFqdn,
    DstnDomain,
    DstnOther,
}

// ═══════════════════════════════════════════════════════════════════════════
// Enum Validators
// ═══════════════════════════════════════════════════════════════════════════

pub fn validate_rule_state(value: &str) -> Result<(), String> {
    one_of::<RuleState>("state", value)
}

pub fn validate_firewall_action(value: &str) -> Result<(), String> {
    one_of::<FirewallAction>("action", value)
}

pub fn validate_dns_action(value: &str) -> Result<(), String> {
    one_of::<DnsAction>("action", value)
}

pub fn validate_dns_block_response_code(value: &str) -> Result<(), String> {
    one_of::<DnsBlockResponseCode>("block_response_code", value)
}

pub fn validate_dns_protocol(value: &str) -> Result<(), String> {
    one_of::<DnsProtocol>("protocol", value)
}

pub fn validate_bandwidth_protocol(value: &str) -> Result<(), String> {
    one_of::<BandwidthProtocol>("protocol", value)
}

pub fn validate_traffic_capture_action(value: &str) -> Result<(), String> {
    one_of::<TrafficCaptureAction>("action", value)
}

pub fn validate_txn_size_limit(value: &str) -> Result<(), String> {
    one_of::<TxnSizeLimit>("txn_size_limit", value)
}

pub fn validate_txn_sampling(value: &str) -> Result<(), String> {
    one_of::<TxnSampling>("txn_sampling", value)
}

pub fn validate_casb_rule_type(value: &str) -> Result<(), String> {
    one_of::<CasbRuleType>("type", value)
}

pub fn validate_casb_action(value: &str) -> Result<(), String> {
    one_of::<CasbAction>("action", value)
}

pub fn validate_rule_severity(value: &str) -> Result<(), String> {
    one_of::<RuleSeverity>("severity", value)
}

pub fn validate_collaboration_scope(value: &str) -> Result<(), String> {
    one_of::<CollaborationScope>("collaboration_scope", value)
}

pub fn validate_device_trust_level(value: &str) -> Result<(), String> {
    one_of::<DeviceTrustLevel>("device_trust_level", value)
}

pub fn validate_destination_group_type(value: &str) -> Result<(), String> {
    one_of::<DestinationGroupType>("type", value)
}

pub fn validate_cloud(value: &str) -> Result<(), String> {
    one_of::<crate::config::ZiaCloud>("zia_cloud", value)
}

// ═══════════════════════════════════════════════════════════════════════════
// Scalar Validators
// ═══════════════════════════════════════════════════════════════════════════

/// Maximum length of a policy rule name.
pub const MAX_RULE_NAME_LEN: usize = 31;

/// Maximum length of a policy object name (labels, groups).
pub const MAX_OBJECT_NAME_LEN: usize = 255;

/// Maximum length of a description.
pub const MAX_DESCRIPTION_LEN: usize = 10_240;

fn validate_length(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.chars().count() > max {
        return Err(format!("{field} too long (max {max} characters)"));
    }
    Ok(())
}

/// Validates a policy rule name (1-31 characters).
pub fn validate_rule_name(value: &str) -> Result<(), String> {
    validate_length("name", value, MAX_RULE_NAME_LEN)
}

/// Validates a policy object name (1-255 characters).
pub fn validate_object_name(value: &str) -> Result<(), String> {
    validate_length("name", value, MAX_OBJECT_NAME_LEN)
}

/// Validates a description (may be empty).
pub fn validate_description(value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_DESCRIPTION_LEN {
        Err(format!(
            "description too long (max {MAX_DESCRIPTION_LEN} characters)"
        ))
    } else {
        Ok(())
    }
}

/// Validates a requested rule order.
pub fn validate_order(value: i64) -> Result<(), String> {
    if value < i64::from(MIN_ORDER) {
        Err(format!("order must be >= {MIN_ORDER}"))
    } else if value > i64::from(i32::MAX) {
        Err("order is out of range".to_string())
    } else {
        Ok(())
    }
}

/// Validates an admin rank (0-7).
pub fn validate_rank(value: i64) -> Result<(), String> {
    if (i64::from(MIN_RANK)..=i64::from(DEFAULT_RANK)).contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "rank must be between {MIN_RANK} and {DEFAULT_RANK}"
        ))
    }
}

/// Validates a bandwidth percentage (0-100).
pub fn validate_percentage(value: i64) -> Result<(), String> {
    if (0..=100).contains(&value) {
        Ok(())
    } else {
        Err("value must be between 0 and 100".to_string())
    }
}

/// Validates a port number (1-65535).
pub fn validate_port(value: i64) -> Result<(), String> {
    if (1..=65_535).contains(&value) {
        Ok(())
    } else {
        Err("Port must be between 1 and 65535".to_string())
    }
}

/// Validates an IP address, a CIDR network, or an `a.b.c.d-e.f.g.h` range.
pub fn validate_ip_address(value: &str) -> Result<(), String> {
    let value = value.trim();
    if let Some((start, end)) = value.split_once('-') {
        let start: IpAddr = start
            .trim()
            .parse()
            .map_err(|_| format!("invalid range start in '{value}'"))?;
        let end: IpAddr = end
            .trim()
            .parse()
            .map_err(|_| format!("invalid range end in '{value}'"))?;
        if start.is_ipv4() != end.is_ipv4() {
            return Err(format!("range '{value}' mixes IPv4 and IPv6"));
        }
        if start > end {
            return Err(format!("range start is after range end in '{value}'"));
        }
        return Ok(());
    }

    value
        .parse::<IpNetwork>()
        .map(|_| ())
        .map_err(|_| format!("'{value}' is not a valid IP address, CIDR or range"))
}

/// Validates a hostname or wildcard domain such as `*.example.com`.
pub fn validate_fqdn(value: &str) -> Result<(), String> {
    let host = value.strip_prefix("*.").unwrap_or(value);
    let host = host.strip_prefix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return Err(format!("'{value}' is not a valid domain name"));
    }
    let labels_ok = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    if labels_ok {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid domain name"))
    }
}

/// Validates a destination address: IP/CIDR/range or domain name.
pub fn validate_destination_address(value: &str) -> Result<(), String> {
    if validate_ip_address(value).is_ok() || validate_fqdn(value).is_ok() {
        Ok(())
    } else {
        Err(format!(
            "'{value}' is neither an IP address, CIDR, range nor a domain name"
        ))
    }
}

/// Validates a ZIA country code such as `COUNTRY_US`.
pub fn validate_country_code(value: &str) -> Result<(), String> {
    match value.strip_prefix("COUNTRY_") {
        Some(code) if code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()) => Ok(()),
        _ => Err(format!(
            "invalid country '{value}', expected COUNTRY_ followed by an ISO 3166 alpha-2 code"
        )),
    }
}

/// Validates an email address (shape only).
pub fn validate_email(value: &str) -> Result<(), String> {
    let Some((local, domain)) = value.split_once('@') else {
        return Err(format!("'{value}' is not a valid email address"));
    };
    if local.is_empty() || local.contains(char::is_whitespace) || !domain.contains('.') {
        return Err(format!("'{value}' is not a valid email address"));
    }
    validate_fqdn(domain).map_err(|_| format!("'{value}' is not a valid email address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_firewall_action() {
        assert!(validate_firewall_action("ALLOW").is_ok());
        assert!(validate_firewall_action("BLOCK_DROP").is_ok());
        assert!(validate_firewall_action("EVAL_NWAPP").is_ok());
        let err = validate_firewall_action("allow").unwrap_err();
        assert!(err.contains("BLOCK_RESET"));
    }

    #[test]
    fn test_dns_action_redirects() {
        assert!(validate_dns_action("REDIR_REQ_DOH").is_ok());
        assert!(validate_dns_action("REDIRECT").is_err());
        assert!(DnsAction::RedirRes.needs_redirect_ip());
        assert!(!DnsAction::RedirZpa.needs_redirect_ip());
        assert!(!DnsAction::Block.needs_redirect_ip());
    }

    #[test]
    fn test_traffic_capture_enums() {
        assert!(validate_traffic_capture_action("CAPTURE").is_ok());
        assert!(validate_txn_size_limit("TWO_FIFTY_SIX_KB").is_ok());
        assert!(validate_txn_sampling("TWENTY_FIVE_PERCENT").is_ok());
        assert!(validate_txn_sampling("50_PERCENT").is_err());
    }

    #[test]
    fn test_casb_enums() {
        assert!(validate_casb_rule_type("OFLCASB_DLP_GENAI").is_ok());
        assert!(validate_casb_action("OFLCASB_DLP_REPORT_INCIDENT").is_ok());
        assert!(validate_rule_severity("RULE_SEVERITY_INFO").is_ok());
        assert!(validate_collaboration_scope("COLLABORATION_SCOPE_PRIVATE_EDIT").is_ok());
        assert!(validate_casb_rule_type("OFLCASB_DLP_FTP").is_err());
    }

    #[test]
    fn test_device_trust_levels() {
        assert!(validate_device_trust_level("UNKNOWN_DEVICETRUSTLEVEL").is_ok());
        assert!(validate_device_trust_level("HIGH_TRUST").is_ok());
        assert!(validate_device_trust_level("TRUSTED").is_err());
    }

    #[test]
    fn test_rule_name_length() {
        assert!(validate_rule_name("Block Tor").is_ok());
        assert!(validate_rule_name("").is_err());
        assert!(validate_rule_name("   ").is_err());
        assert!(validate_rule_name(&"x".repeat(31)).is_ok());
        assert!(validate_rule_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_order_and_rank() {
        assert!(validate_order(1).is_ok());
        assert!(validate_order(0).is_err());
        assert!(validate_rank(0).is_ok());
        assert!(validate_rank(7).is_ok());
        assert!(validate_rank(8).is_err());
    }

    #[test]
    fn test_ip_addresses() {
        assert!(validate_ip_address("10.0.0.1").is_ok());
        assert!(validate_ip_address("10.0.0.0/8").is_ok());
        assert!(validate_ip_address("192.168.1.1-192.168.1.20").is_ok());
        assert!(validate_ip_address("2001:db8::/32").is_ok());
        assert!(validate_ip_address("192.168.1.20-192.168.1.1").is_err());
        assert!(validate_ip_address("10.0.0.1-2001:db8::1").is_err());
        assert!(validate_ip_address("not-an-ip").is_err());
    }

    #[test]
    fn test_destination_addresses() {
        assert!(validate_destination_address("*.example.com").is_ok());
        assert!(validate_destination_address(".example.com").is_ok());
        assert!(validate_destination_address("8.8.8.8").is_ok());
        assert!(validate_destination_address("bad host!").is_err());
    }

    #[test]
    fn test_country_codes() {
        assert!(validate_country_code("COUNTRY_US").is_ok());
        assert!(validate_country_code("US").is_err());
        assert!(validate_country_code("COUNTRY_usa").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("auditor@example.com").is_ok());
        assert!(validate_email("auditor").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    proptest! {
        #[test]
        fn any_ipv4_is_valid(a: u8, b: u8, c: u8, d: u8) {
            let addr = format!("{a}.{b}.{c}.{d}");
            prop_assert!(validate_ip_address(&addr).is_ok());
        }

        #[test]
        fn any_prefix_cidr_is_valid(a: u8, prefix in 0u8..=32) {
            let cidr = format!("{a}.0.0.0/{prefix}");
            prop_assert!(validate_ip_address(&cidr).is_ok());
        }

        #[test]
        fn percentages_outside_range_rejected(v in 101i64..10_000) {
            prop_assert!(validate_percentage(v).is_err());
            prop_assert!(validate_percentage(-v).is_err());
        }
    }
}
