//! Roles, departments, and the authority ladder they resolve to.

use crate::error::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operational department owning an entity or employing a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Deck,
    Engineering,
    Interior,
    Galley,
    Bridge,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::Deck,
        Department::Engineering,
        Department::Interior,
        Department::Galley,
        Department::Bridge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Deck => "deck",
            Department::Engineering => "engineering",
            Department::Interior => "interior",
            Department::Galley => "galley",
            Department::Bridge => "bridge",
        }
    }
}

impl FromStr for Department {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| UnknownVariant::new("department", s))
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rung on the authority ladder. Ordering is meaningful: higher rungs include
/// every power of the lower ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Member,
    HeadOfDepartment,
    Captain,
    FleetManager,
}

impl AuthorityLevel {
    /// Heads of department and above may act across department lines.
    pub fn has_cross_department_authority(&self) -> bool {
        *self >= AuthorityLevel::HeadOfDepartment
    }
}

/// Crew role as carried on the user session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Crew,
    Deckhand,
    Engineer,
    Steward,
    Chef,
    Bosun,
    ChiefOfficer,
    ChiefEngineer,
    ChiefSteward,
    HeadChef,
    Captain,
    FleetManager,
    Manager,
}

impl Role {
    pub const ALL: [Role; 13] = [
        Role::Crew,
        Role::Deckhand,
        Role::Engineer,
        Role::Steward,
        Role::Chef,
        Role::Bosun,
        Role::ChiefOfficer,
        Role::ChiefEngineer,
        Role::ChiefSteward,
        Role::HeadChef,
        Role::Captain,
        Role::FleetManager,
        Role::Manager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Crew => "crew",
            Role::Deckhand => "deckhand",
            Role::Engineer => "engineer",
            Role::Steward => "steward",
            Role::Chef => "chef",
            Role::Bosun => "bosun",
            Role::ChiefOfficer => "chief_officer",
            Role::ChiefEngineer => "chief_engineer",
            Role::ChiefSteward => "chief_steward",
            Role::HeadChef => "head_chef",
            Role::Captain => "captain",
            Role::FleetManager => "fleet_manager",
            Role::Manager => "manager",
        }
    }

    pub fn authority_level(&self) -> AuthorityLevel {
        match self {
            Role::Crew | Role::Deckhand | Role::Engineer | Role::Steward | Role::Chef => {
                AuthorityLevel::Member
            }
            Role::Bosun
            | Role::ChiefOfficer
            | Role::ChiefEngineer
            | Role::ChiefSteward
            | Role::HeadChef => AuthorityLevel::HeadOfDepartment,
            Role::Captain => AuthorityLevel::Captain,
            Role::FleetManager | Role::Manager => AuthorityLevel::FleetManager,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == needle)
            .ok_or_else(|| UnknownVariant::new("role", s))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
