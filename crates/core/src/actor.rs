//! Caller identity threaded explicitly through every engine call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wagerly_shared::types::UserId;

/// Back-office role of a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Customer support; can act on a player's behalf but not approve.
    Support,
    /// Finance team; can grant bonuses and approve payouts.
    FinanceManager,
    /// Compliance team; can approve and escalate.
    ComplianceOfficer,
    /// Full back-office access.
    Admin,
}

impl StaffRole {
    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "support" => Some(Self::Support),
            "finance_manager" => Some(Self::FinanceManager),
            "compliance_officer" => Some(Self::ComplianceOfficer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::FinanceManager => "finance_manager",
            Self::ComplianceOfficer => "compliance_officer",
            Self::Admin => "admin",
        }
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// Automated platform processes (payment callbacks, game servers, sweeps).
    System,
    /// A player acting on their own wallet.
    Player {
        /// The player's id.
        id: UserId,
    },
    /// A back-office staff member.
    Staff {
        /// The staff member's id.
        id: UserId,
        /// Their role.
        role: StaffRole,
    },
}

impl Actor {
    /// Shorthand for a player actor.
    #[must_use]
    pub const fn player(id: UserId) -> Self {
        Self::Player { id }
    }

    /// Shorthand for a staff actor.
    #[must_use]
    pub const fn staff(id: UserId, role: StaffRole) -> Self {
        Self::Staff { id, role }
    }

    /// The underlying user id, if the actor is a person.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::Player { id } | Self::Staff { id, .. } => Some(*id),
        }
    }

    /// Staff role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<StaffRole> {
        match self {
            Self::Staff { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Whether this actor may move money on `user`'s wallet.
    #[must_use]
    pub fn can_act_for(&self, user: UserId) -> bool {
        match self {
            Self::System | Self::Staff { .. } => true,
            Self::Player { id } => *id == user,
        }
    }

    /// Whether this actor may grant promotional credit.
    #[must_use]
    pub const fn can_grant_bonus(&self) -> bool {
        matches!(
            self,
            Self::System
                | Self::Staff {
                    role: StaffRole::FinanceManager | StaffRole::Admin,
                    ..
                }
        )
    }

    /// Whether this actor may sign off an approval workflow.
    #[must_use]
    pub const fn can_approve(&self) -> bool {
        matches!(
            self,
            Self::Staff {
                role: StaffRole::FinanceManager | StaffRole::ComplianceOfficer | StaffRole::Admin,
                ..
            }
        )
    }

    /// Whether this actor may escalate or reopen a workflow.
    #[must_use]
    pub const fn can_escalate(&self) -> bool {
        matches!(
            self,
            Self::Staff {
                role: StaffRole::ComplianceOfficer,
                ..
            }
        )
    }

    /// Whether this actor may post corrections (adjustments, reversals, freezes).
    #[must_use]
    pub const fn can_correct(&self) -> bool {
        matches!(
            self,
            Self::Staff {
                role: StaffRole::FinanceManager | StaffRole::ComplianceOfficer | StaffRole::Admin,
                ..
            }
        )
    }

    /// Whether this actor is an administrator.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Staff {
                role: StaffRole::Admin,
                ..
            }
        )
    }
}

/// Formats as `system`, `player:<id>` or `staff:<role>:<id>`.
impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Player { id } => write!(f, "player:{id}"),
            Self::Staff { id, role } => write!(f, "staff:{}:{id}", role.as_str()),
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid actor: {s}");
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("system"), None, None) => Ok(Self::System),
            (Some("player"), Some(id), None) => {
                Ok(Self::player(id.parse().map_err(|_| invalid())?))
            }
            (Some("staff"), Some(role), Some(id)) => Ok(Self::staff(
                id.parse().map_err(|_| invalid())?,
                StaffRole::parse(role).ok_or_else(invalid)?,
            )),
            _ => Err(invalid()),
        }
    }
}
