//! Action records produced by the decision engine, and shorthand expansion.

use serde::{Deserialize, Serialize};

/// Label every movement shorthand is rewritten to.
pub const MOVE_LABEL: &str = "move";

/// Movement labels the decision engine may emit without a value.
pub const SHORTHAND_LABELS: [&str; 5] = [
    "stand still",
    "turn left",
    "turn right",
    "move forwards",
    "move back",
];

/// A single discrete instruction for one dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub value: String,
}

impl Action {
    pub fn new(action_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            value: value.into(),
        }
    }

    /// Lowercased type, used as the lookup key for bindings and signals.
    pub fn label(&self) -> String {
        self.action_type.to_lowercase()
    }

    /// Expand movement shorthand in place.
    ///
    /// `{type: "turn left", value: ""}` becomes `{type: "move", value: "turn left"}`.
    /// Anything else is left untouched, so applying this twice is the same
    /// as applying it once.
    pub fn normalize(&mut self) {
        let label = self.label();
        if self.value.is_empty() && is_shorthand(&label) {
            self.action_type = MOVE_LABEL.to_string();
            self.value = label;
        }
    }
}

/// Consuming form of [`Action::normalize`].
pub fn normalize(mut action: Action) -> Action {
    action.normalize();
    action
}

/// Whether `label` (already lowercased) is a movement shorthand.
pub fn is_shorthand(label: &str) -> bool {
    SHORTHAND_LABELS.contains(&label)
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.action_type, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_expands_to_move() {
        for label in SHORTHAND_LABELS {
            let action = normalize(Action::new(label, ""));
            assert_eq!(action.action_type, "move");
            assert_eq!(action.value, label);
        }
    }

    #[test]
    fn test_shorthand_is_case_insensitive() {
        let action = normalize(Action::new("Turn Left", ""));
        assert_eq!(action, Action::new("move", "turn left"));
    }

    #[test]
    fn test_shorthand_with_value_is_untouched() {
        let action = normalize(Action::new("turn left", "slowly"));
        assert_eq!(action, Action::new("turn left", "slowly"));
    }

    #[test]
    fn test_unrecognized_passes_through() {
        let original = Action::new("speak", "hello there");
        assert_eq!(normalize(original.clone()), original);

        let unknown = Action::new("levitate", "");
        assert_eq!(normalize(unknown.clone()), unknown);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            Action::new("stand still", ""),
            Action::new("MOVE BACK", ""),
            Action::new("move", "turn right"),
            Action::new("face", "happy"),
            Action::new("", ""),
        ];
        for input in inputs {
            let once = normalize(input.clone());
            let twice = normalize(once.clone());
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_label_lowercases() {
        assert_eq!(Action::new("Speak", "hi").label(), "speak");
    }

    #[test]
    fn test_deserialize_defaults_value() {
        let action: Action = serde_json::from_str(r#"{"type": "stand still"}"#).unwrap();
        assert_eq!(action.action_type, "stand still");
        assert!(action.value.is_empty());
    }
}
