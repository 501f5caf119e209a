use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn active_default() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub description: String,
    /// `false` once the project has been soft-deleted.
    #[serde(rename = "status", default = "active_default")]
    pub active: bool,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn is_managed_by(&self, user_id: Option<&str>) -> bool {
        match (self.manager.as_deref(), user_id) {
            (Some(manager), Some(user)) => manager == user,
            _ => false,
        }
    }
}

/// Body of `create-project`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    pub title: String,
    pub client: String,
    pub description: String,
}

/// Body of `update-project`; absent fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_means_active() {
        let p: Project = serde_json::from_str(r#"{"_id":"p1","title":"Site"}"#).unwrap();
        assert!(p.active);
        assert!(!p.is_managed_by(Some("u1")));
    }

    #[test]
    fn manager_check_needs_both_ids() {
        let p: Project =
            serde_json::from_str(r#"{"_id":"p1","title":"Site","status":false,"manager":"u1"}"#)
                .unwrap();
        assert!(!p.active);
        assert!(p.is_managed_by(Some("u1")));
        assert!(!p.is_managed_by(Some("u2")));
        assert!(!p.is_managed_by(None));
    }

    #[test]
    fn update_skips_unset_fields() {
        let update = ProjectUpdate {
            title: Some("New".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"title":"New"}"#);
    }
}
