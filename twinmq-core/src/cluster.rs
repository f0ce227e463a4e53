use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifies which of the two independently configured broker clusters a
/// channel or a published message targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterRole {
    /// The active cluster, always preferred when enabled.
    #[serde(rename = "PRIMARY")]
    Primary,
    /// The passive cluster, used only when the primary is disabled.
    #[serde(rename = "SECONDARY")]
    Secondary,
}

impl ClusterRole {
    pub const ALL: [ClusterRole; 2] = [ClusterRole::Primary, ClusterRole::Secondary];

    /// The literal tag carried in the `type` property of every published message.
    pub fn tag(&self) -> &'static str {
        match self {
            ClusterRole::Primary => "PRIMARY",
            ClusterRole::Secondary => "SECONDARY",
        }
    }
}

impl Display for ClusterRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_matches_display() {
        for role in ClusterRole::ALL {
            assert_eq!(role.to_string(), role.tag());
        }
        assert_eq!(ClusterRole::Primary.tag(), "PRIMARY");
        assert_eq!(ClusterRole::Secondary.tag(), "SECONDARY");
    }

    #[test]
    fn deserializes_from_wire_tag() {
        let role: ClusterRole = serde_yaml::from_str("SECONDARY").unwrap();
        assert_eq!(role, ClusterRole::Secondary);
    }
}
