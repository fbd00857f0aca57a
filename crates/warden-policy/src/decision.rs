use serde::{Deserialize, Serialize};
use std::fmt;

/// The policy engine's verdict on one action request.
///
/// Ordered by restrictiveness: `Deny > RequireAttestation > RequireApproval >
/// Allow`. The derived `Ord` is the lattice order, so [`Decision::merge`] is
/// just `max` — associative, commutative, and idempotent, which means rule
/// ordering cannot change an outcome except through the documented DENY
/// short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    RequireApproval,
    RequireAttestation,
    Deny,
}

impl Decision {
    /// Most-restrictive-wins join of two decisions.
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Whether this decision parks the request at the approval gate.
    pub fn needs_human(&self) -> bool {
        matches!(self, Self::RequireApproval | Self::RequireAttestation)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Allow => "allow",
            Self::RequireApproval => "require_approval",
            Self::RequireAttestation => "require_attestation",
            Self::Deny => "deny",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Decision; 4] = [
        Decision::Allow,
        Decision::RequireApproval,
        Decision::RequireAttestation,
        Decision::Deny,
    ];

    #[test]
    fn test_lattice_order() {
        assert!(Decision::Allow < Decision::RequireApproval);
        assert!(Decision::RequireApproval < Decision::RequireAttestation);
        assert!(Decision::RequireAttestation < Decision::Deny);
    }

    #[test]
    fn test_merge_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.merge(b), b.merge(a));
            }
        }
    }

    #[test]
    fn test_merge_associative() {
        for a in ALL {
            for b in ALL {
                for c in ALL {
                    assert_eq!(a.merge(b).merge(c), a.merge(b.merge(c)));
                }
            }
        }
    }

    #[test]
    fn test_merge_idempotent() {
        for a in ALL {
            assert_eq!(a.merge(a), a);
        }
    }

    #[test]
    fn test_deny_absorbs() {
        for a in ALL {
            assert_eq!(a.merge(Decision::Deny), Decision::Deny);
        }
    }
}
