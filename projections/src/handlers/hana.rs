//! SAPHanaSR node attribute parsing.
//!
//! The HANA resource agents publish per-node attributes named
//! `hana_<sid>_<attribute>`. The `roles` attribute packs several fields into
//! one colon-separated string. Only the first two segments are read:
//!
//! ```text
//! 4:P:master1:master:worker:master
//! │ └── replication status: P = primary, S = secondary
//! └── health
//! ```
//!
//! Malformed values never fail the projection; they parse to
//! [`HanaRoles::unknown`].

use discovery_core::ClusterNode;
use std::fmt;

/// Sentinel for fields that could not be recovered.
pub const UNKNOWN: &str = "unknown";

/// Replication status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HanaStatus {
    /// Primary site
    Primary,
    /// Secondary site
    Secondary,
    /// Anything else
    Unknown,
}

impl fmt::Display for HanaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "Primary",
            Self::Secondary => "Secondary",
            Self::Unknown => UNKNOWN,
        })
    }
}

/// Fields recovered from a `hana_<sid>_roles` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HanaRoles {
    /// Health digit, e.g. `4`
    pub health: String,
    /// Replication status
    pub status: HanaStatus,
}

impl HanaRoles {
    /// The value malformed input degrades to.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            health: UNKNOWN.to_string(),
            status: HanaStatus::Unknown,
        }
    }

    /// Parse a roles string by fixed position: index 0 and index 1.
    ///
    /// # Example
    ///
    /// ```
    /// use discovery_projections::handlers::hana::{HanaRoles, HanaStatus};
    ///
    /// let roles = HanaRoles::parse("4:P:master1:master:worker:master");
    /// assert_eq!(roles.health, "4");
    /// assert_eq!(roles.status, HanaStatus::Primary);
    ///
    /// assert_eq!(HanaRoles::parse("garbage"), HanaRoles::unknown());
    /// ```
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut segments = value.split(':');
        let (Some(health), Some(status)) = (segments.next(), segments.next()) else {
            return Self::unknown();
        };

        if health.is_empty() {
            return Self::unknown();
        }

        let status = match status {
            "P" => HanaStatus::Primary,
            "S" => HanaStatus::Secondary,
            _ => HanaStatus::Unknown,
        };
        Self {
            health: health.to_string(),
            status,
        }
    }
}

/// Name of the HANA attribute `attribute` for `sid`.
#[must_use]
pub fn attribute_name(sid: &str, attribute: &str) -> String {
    format!("hana_{}_{attribute}", sid.to_lowercase())
}

/// Value of the HANA attribute `attribute` for `sid` on `node`.
#[must_use]
pub fn attribute<'a>(node: &'a ClusterNode, sid: &str, attribute: &str) -> Option<&'a str> {
    node.attributes
        .get(&attribute_name(sid, attribute))
        .map(String::as_str)
}

/// Parsed `roles` attribute of `node`, if present.
#[must_use]
pub fn roles(node: &ClusterNode, sid: &str) -> Option<HanaRoles> {
    attribute(node, sid, "roles").map(HanaRoles::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn secondary_roles() {
        let roles = HanaRoles::parse("4:S:master1:master:worker:master");
        assert_eq!(roles.status, HanaStatus::Secondary);
        assert_eq!(roles.status.to_string(), "Secondary");
    }

    #[test]
    fn unexpected_status_letter_is_unknown() {
        let roles = HanaRoles::parse("1:X:master1");
        assert_eq!(roles.health, "1");
        assert_eq!(roles.status, HanaStatus::Unknown);
    }

    #[test]
    fn missing_delimiters_degrade_to_sentinel() {
        assert_eq!(HanaRoles::parse(""), HanaRoles::unknown());
        assert_eq!(HanaRoles::parse("4"), HanaRoles::unknown());
        assert_eq!(HanaRoles::parse(":P:x"), HanaRoles::unknown());
    }

    #[test]
    fn trailing_colon_keeps_health_and_status() {
        let roles = HanaRoles::parse("4:P:");
        assert_eq!(roles.health, "4");
        assert_eq!(roles.status, HanaStatus::Primary);
    }

    #[test]
    fn attribute_names_use_lowercase_sid() {
        assert_eq!(attribute_name("PRD", "srmode"), "hana_prd_srmode");
    }

    proptest! {
        #[test]
        fn parse_never_panics(value in ".*") {
            let _ = HanaRoles::parse(&value);
        }

        #[test]
        fn strings_without_colon_are_unknown(value in "[^:]*") {
            prop_assert_eq!(HanaRoles::parse(&value), HanaRoles::unknown());
        }
    }
}
