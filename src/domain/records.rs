// List records returned by the catalog endpoints
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub chart_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub widget_count: usize,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A saved query result, bindable to a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Client-side filter for the list pages.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub search: Option<String>,
    pub status: Option<String>,
    pub kind: Option<String>,
    pub visibility: Option<Visibility>,
}

impl RecordFilter {
    pub fn search(text: &str) -> Self {
        Self {
            search: Some(text.to_string()),
            ..Self::default()
        }
    }

    fn matches_text(&self, name: &str) -> bool {
        match &self.search {
            Some(needle) if !needle.trim().is_empty() => name
                .to_lowercase()
                .contains(&needle.trim().to_lowercase()),
            _ => true,
        }
    }

    fn matches_visibility(&self, is_public: bool) -> bool {
        match self.visibility {
            Some(Visibility::Public) => is_public,
            Some(Visibility::Private) => !is_public,
            None => true,
        }
    }

    pub fn matches_chart(&self, chart: &ChartRecord) -> bool {
        self.matches_text(&chart.name)
            && self.matches_visibility(chart.is_public)
            && self
                .status
                .as_ref()
                .is_none_or(|s| chart.status.eq_ignore_ascii_case(s))
            && self
                .kind
                .as_ref()
                .is_none_or(|k| chart.chart_type.eq_ignore_ascii_case(k))
    }

    pub fn matches_dashboard(&self, dashboard: &DashboardRecord) -> bool {
        self.matches_text(&dashboard.title) && self.matches_visibility(dashboard.is_public)
    }
}
