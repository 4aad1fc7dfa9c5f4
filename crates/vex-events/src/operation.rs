//! The six provisioning operations, one per (entity, direction) pair.

use std::fmt;

/// Direction of a provisioning operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Provision,
    Deprovision,
}

impl Direction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Deprovision => "deprovision",
        }
    }
}

/// Entity whose edge representation an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Project,
    Flag,
    Token,
}

impl Entity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Flag => "flag",
            Self::Token => "token",
        }
    }
}

/// A provisioning operation. Each maps to exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ProvisionProject,
    DeprovisionProject,
    ProvisionToken,
    DeprovisionToken,
    ProvisionFlag,
    DeprovisionFlag,
}

impl Operation {
    /// Every operation, in topic-configuration order.
    pub const ALL: [Operation; 6] = [
        Self::ProvisionProject,
        Self::DeprovisionProject,
        Self::ProvisionToken,
        Self::DeprovisionToken,
        Self::ProvisionFlag,
        Self::DeprovisionFlag,
    ];

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::ProvisionProject | Self::ProvisionToken | Self::ProvisionFlag => {
                Direction::Provision
            }
            Self::DeprovisionProject | Self::DeprovisionToken | Self::DeprovisionFlag => {
                Direction::Deprovision
            }
        }
    }

    #[must_use]
    pub fn entity(&self) -> Entity {
        match self {
            Self::ProvisionProject | Self::DeprovisionProject => Entity::Project,
            Self::ProvisionToken | Self::DeprovisionToken => Entity::Token,
            Self::ProvisionFlag | Self::DeprovisionFlag => Entity::Flag,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.direction().as_str(), self.entity().as_str())
    }
}
