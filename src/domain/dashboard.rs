// Dashboard domain model
use super::widget::Widget;
use super::error::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default = "empty_object")]
    pub layout: Value,
    #[serde(default = "empty_object")]
    pub filters: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Dashboard {
    pub fn new(id: String, title: String, widgets: Vec<Widget>) -> Self {
        Self {
            id,
            title,
            widgets,
            layout: empty_object(),
            filters: empty_object(),
        }
    }

    /// Presence checks only; the backend owns everything else.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        ValidationError::check(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let dashboard = Dashboard::new("d1".to_string(), "Revenue".to_string(), vec![]);
        assert!(dashboard.validate().is_ok());

        let blank = Dashboard::new(" ".to_string(), String::new(), vec![]);
        let err = blank.validate().unwrap_err();
        assert_eq!(err.missing, vec!["id", "title"]);
    }
}
