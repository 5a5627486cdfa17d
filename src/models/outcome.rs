// src/models/outcome.rs
use serde::{Deserialize, Serialize};

/// A committed result plus any side effects (notifications, gateway calls)
/// that failed after the commit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Outcome<T> {
    #[serde(flatten)]
    pub value: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn warn_if(mut self, warning: Option<String>) -> Self {
        self.warnings.extend(warning);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Thing {
        id: String,
    }

    #[test]
    fn warnings_are_omitted_when_empty() {
        let outcome = Outcome::new(Thing { id: "rid-1".into() });
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"id": "rid-1"}));

        let outcome = outcome.warn_if(Some("notification failed".into())).warn_if(None);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"id": "rid-1", "warnings": ["notification failed"]})
        );
    }
}
