//! Typed views of polymorphic VPC response shapes
//!
//! The API returns several fields whose shape depends on a discriminator
//! (`action` for listener policies, `type` for bandwidth). They are decoded
//! once here into tagged enums.

use serde::{Deserialize, Serialize};

// =============================================================================
// Listener policy targets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerReference {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub url: String,
    pub http_status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsRedirectTarget {
    pub listener: ListenerReference,
    pub http_status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// What a listener policy does with matching requests
///
/// Serialized as `{"action": ..., "target": ...}`, which is also how the
/// policy document carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum PolicyRule {
    Forward(PoolReference),
    Redirect(RedirectTarget),
    HttpsRedirect(HttpsRedirectTarget),
    Reject,
}

impl PolicyRule {
    pub fn action(&self) -> &'static str {
        match self {
            PolicyRule::Forward(_) => "forward",
            PolicyRule::Redirect(_) => "redirect",
            PolicyRule::HttpsRedirect(_) => "https_redirect",
            PolicyRule::Reject => "reject",
        }
    }
}

// =============================================================================
// Bare metal server profiles
// =============================================================================

/// Network bandwidth of a bare metal server profile, in megabits per second
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bandwidth {
    Fixed {
        value: u64,
    },
    Range {
        min: u64,
        max: u64,
        step: u64,
        default: u64,
    },
    Enum {
        values: Vec<u64>,
        default: u64,
    },
    /// Depends on the configuration of the server
    Dependent,
}

impl Bandwidth {
    /// Bandwidth a server gets when none is requested
    pub fn default_value(&self) -> Option<u64> {
        match self {
            Bandwidth::Fixed { value } => Some(*value),
            Bandwidth::Range { default, .. } | Bandwidth::Enum { default, .. } => Some(*default),
            Bandwidth::Dependent => None,
        }
    }

    /// Whether a server with this profile can be given `value`
    pub fn allows(&self, value: u64) -> bool {
        match self {
            Bandwidth::Fixed { value: fixed } => *fixed == value,
            Bandwidth::Range { min, max, step, .. } => {
                value >= *min && value <= *max && (*step == 0 || (value - min) % step == 0)
            }
            Bandwidth::Enum { values, .. } => values.contains(&value),
            Bandwidth::Dependent => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BareMetalServerProfile {
    pub name: String,
    #[serde(default)]
    pub family: Option<String>,
    pub bandwidth: Bandwidth,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn policy_rule_decodes_from_policy_document() {
        let document = json!({
            "id": "pol",
            "priority": 1,
            "action": "forward",
            "target": {"id": "pool-1", "href": "https://x", "name": "web"},
            "provisioning_status": "active"
        });
        let rule: PolicyRule = serde_json::from_value(document).unwrap();
        assert_eq!(
            rule,
            PolicyRule::Forward(PoolReference {
                id: "pool-1".to_string(),
                name: Some("web".to_string())
            })
        );
    }

    #[test]
    fn reject_has_no_target() {
        let rule: PolicyRule = serde_json::from_value(json!({"action": "reject"})).unwrap();
        assert_eq!(rule, PolicyRule::Reject);
        assert_eq!(serde_json::to_value(&rule).unwrap(), json!({"action": "reject"}));
    }

    #[test]
    fn https_redirect_serializes_with_listener() {
        let rule = PolicyRule::HttpsRedirect(HttpsRedirectTarget {
            listener: ListenerReference {
                id: "lis-443".to_string(),
            },
            http_status_code: 301,
            uri: None,
        });
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "action": "https_redirect",
                "target": {"listener": {"id": "lis-443"}, "http_status_code": 301}
            })
        );
        assert_eq!(rule.action(), "https_redirect");
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_value::<PolicyRule>(json!({"action": "teleport"})).is_err());
    }

    #[test]
    fn bandwidth_variants() {
        let profile: BareMetalServerProfile = serde_json::from_value(json!({
            "name": "bx2-metal-192x768",
            "family": "balanced",
            "bandwidth": {"type": "enum", "values": [10000, 25000, 100000], "default": 25000}
        }))
        .unwrap();
        assert_eq!(profile.bandwidth.default_value(), Some(25000));
        assert!(profile.bandwidth.allows(100000));
        assert!(!profile.bandwidth.allows(50000));

        let range: Bandwidth = serde_json::from_value(json!({
            "type": "range", "min": 1000, "max": 10000, "step": 1000, "default": 4000
        }))
        .unwrap();
        assert!(range.allows(3000));
        assert!(!range.allows(3500));

        let dependent: Bandwidth = serde_json::from_value(json!({"type": "dependent"})).unwrap();
        assert_eq!(dependent.default_value(), None);

        let fixed: Bandwidth = serde_json::from_value(json!({"type": "fixed", "value": 20000})).unwrap();
        assert!(fixed.allows(20000));
    }
}
