use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of approval roles. Seniority is a total order on rank; a role
/// may decide any stage whose required role it equals or outranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    EstatesOfficer,
    PropertyManager,
    EstatesDirector,
    Administrator,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}` (expected estates_officer|property_manager|estates_director|administrator)")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Self::EstatesOfficer => 1,
            Self::PropertyManager => 2,
            Self::EstatesDirector => 3,
            Self::Administrator => 4,
        }
    }

    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EstatesOfficer => "estates_officer",
            Self::PropertyManager => "property_manager",
            Self::EstatesDirector => "estates_director",
            Self::Administrator => "administrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "estates_officer" => Ok(Self::EstatesOfficer),
            "property_manager" => Ok(Self::PropertyManager),
            "estates_director" => Ok(Self::EstatesDirector),
            "administrator" => Ok(Self::Administrator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn seniority_order_is_strict() {
        assert!(Role::PropertyManager.satisfies(Role::EstatesOfficer));
        assert!(Role::Administrator.satisfies(Role::EstatesDirector));
        assert!(!Role::EstatesOfficer.satisfies(Role::PropertyManager));
    }

    #[test]
    fn every_role_satisfies_itself() {
        for role in [
            Role::EstatesOfficer,
            Role::PropertyManager,
            Role::EstatesDirector,
            Role::Administrator,
        ] {
            assert!(role.satisfies(role));
        }
    }

    #[test]
    fn parse_round_trips_through_as_str() {
        for role in [
            Role::EstatesOfficer,
            Role::PropertyManager,
            Role::EstatesDirector,
            Role::Administrator,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn parse_rejects_unknown_role_strings() {
        assert!("admin".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }
}
