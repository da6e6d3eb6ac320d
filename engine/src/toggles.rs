use serde::{Deserialize, Serialize};

/// Operator overlay switches. Passed by value into every reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleState {
    pub show_predictions: bool,
    /// Hides incidents with `verified == true` when off. Resolved status is
    /// not modeled separately.
    pub show_resolved: bool,
    pub show_user_location: bool,
}

impl Default for ToggleState {
    fn default() -> Self {
        Self {
            show_predictions: true,
            show_resolved: true,
            show_user_location: false,
        }
    }
}

impl ToggleState {
    pub fn with_predictions(self, show_predictions: bool) -> Self {
        Self {
            show_predictions,
            ..self
        }
    }

    pub fn with_resolved(self, show_resolved: bool) -> Self {
        Self {
            show_resolved,
            ..self
        }
    }

    pub fn with_user_location(self, show_user_location: bool) -> Self {
        Self {
            show_user_location,
            ..self
        }
    }

    pub fn admits_verified(&self, verified: bool) -> bool {
        self.show_resolved || !verified
    }
}

#[cfg(test)]
mod tests {
    use super::ToggleState;

    #[test]
    fn builders_change_only_one_flag() {
        let base = ToggleState::default();
        let flipped = base.with_predictions(false);
        assert!(!flipped.show_predictions);
        assert_eq!(flipped.show_resolved, base.show_resolved);
        assert_eq!(flipped.show_user_location, base.show_user_location);
    }

    #[test]
    fn hiding_resolved_hides_verified_only() {
        let toggles = ToggleState::default().with_resolved(false);
        assert!(!toggles.admits_verified(true));
        assert!(toggles.admits_verified(false));
        assert!(ToggleState::default().admits_verified(true));
    }
}
