//! Permission state model.

use serde::{Deserialize, Serialize};

/// Explicit permission decision for a user.
///
/// `Default` means "no special permission": nothing is stored for it and
/// the command's own default applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermState {
    Allow,
    Deny,
    #[default]
    Default,
}

impl PermState {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ALLOW" => Some(Self::Allow),
            "DENY" => Some(Self::Deny),
            "DEFAULT" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
            Self::Default => "DEFAULT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for state in [PermState::Allow, PermState::Deny, PermState::Default] {
            assert_eq!(PermState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(PermState::from_str("allow"), Some(PermState::Allow));
        assert_eq!(PermState::from_str("maybe"), None);
    }
}
