//! Change notifications that make a policy store re-read its grants.

use serde::{Deserialize, Serialize};

/// Why a policy rebuild was requested.
///
/// Hosts translate their own signals (window focus, a cross-tab broadcast,
/// a refresh button) into one of these and publish it on the trigger bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// First read after the store was created.
    Initial,
    /// The principal's grants changed elsewhere (another tab, an admin screen).
    GrantsChanged,
    /// The host regained visibility/focus; re-sync in case another tab changed things.
    FocusRegained,
    /// Explicit refresh requested by the host.
    Manual,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::GrantsChanged => "grants_changed",
            Self::FocusRegained => "focus_regained",
            Self::Manual => "manual",
        }
    }
}

impl core::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_display() {
        for trigger in [
            RefreshTrigger::Initial,
            RefreshTrigger::GrantsChanged,
            RefreshTrigger::FocusRegained,
            RefreshTrigger::Manual,
        ] {
            let json = serde_json::to_string(&trigger).unwrap();
            assert_eq!(json, format!("\"{}\"", trigger));
        }
    }
}
