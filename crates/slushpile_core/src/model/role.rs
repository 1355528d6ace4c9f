//! Editorial caller roles.
//!
//! Roles are supplied by the external identity provider. Core only relies on
//! their total order: `Reader < Editor < Director <= Admin`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Ordered editorial role of a caller.
///
/// Variant order defines the gate order; `Admin` passes every gate that
/// `Director` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Can view and annotate; advances unreviewed manuscripts.
    Reader,
    /// Can recommend, assign and fast-pass.
    Editor,
    /// Acquisitions director; records the final decision.
    Director,
    /// Organization administrator.
    Admin,
}

impl Role {
    /// Stable string id used by the identity provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Editor => "editor",
            Self::Director => "director",
            Self::Admin => "admin",
        }
    }

    /// Whether this role satisfies a minimum-role gate.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl Display for UnknownRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown role `{}`; expected reader|editor|director|admin",
            self.0
        )
    }
}

impl Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reader" => Ok(Self::Reader),
            "editor" => Ok(Self::Editor),
            "director" => Ok(Self::Director),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn roles_form_a_total_order() {
        assert!(Role::Reader < Role::Editor);
        assert!(Role::Editor < Role::Director);
        assert!(Role::Director <= Role::Admin);
        assert!(Role::Admin.satisfies(Role::Director));
        assert!(!Role::Reader.satisfies(Role::Editor));
    }

    #[test]
    fn parses_provider_strings() {
        assert_eq!(" Editor ".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("publisher".parse::<Role>().is_err());
    }
}
