//! Account and profile types exchanged with the `/auth` endpoints.

use serde::{Deserialize, Serialize};

/// The signed-in user as resolved by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub bio: Option<String>,
    /// Server-formatted creation timestamp, displayed as-is
    #[serde(default)]
    pub created_at: Option<String>,
}

impl UserProfile {
    /// Short label for status lines: `username <email>`, with an admin marker.
    pub fn display_name(&self) -> String {
        if self.is_admin {
            format!("{} <{}> (admin)", self.username, self.email)
        } else {
            format!("{} <{}>", self.username, self.email)
        }
    }
}

/// Registration payload.
#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Partial profile edit; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.bio.is_none()
    }
}

/// Response of the token issuance endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_profile() {
        let json = r#"{"username": "alice", "email": "alice@example.com", "bio": null,
                       "id": 7, "is_admin": false, "created_at": "2024-03-01 10:15:00.123456"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("parse profile");
        assert_eq!(user.id, 7);
        assert_eq!(user.username, "alice");
        assert_eq!(user.bio, None);
        assert_eq!(user.created_at.as_deref(), Some("2024-03-01 10:15:00.123456"));
    }

    #[test]
    fn test_parse_minimal_profile() {
        let json = r#"{"id": 1, "username": "root", "email": "root@example.com"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("parse profile");
        assert!(!user.is_admin);
        assert!(user.created_at.is_none());
    }

    #[test]
    fn test_display_name() {
        let mut user = UserProfile {
            id: 1,
            username: "sara".into(),
            email: "sara@example.com".into(),
            is_admin: false,
            bio: None,
            created_at: None,
        };
        assert_eq!(user.display_name(), "sara <sara@example.com>");
        user.is_admin = true;
        assert_eq!(user.display_name(), "sara <sara@example.com> (admin)");
    }

    #[test]
    fn test_profile_update_skips_unset_fields() {
        let update = ProfileUpdate {
            bio: Some("Rust developer".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json, serde_json::json!({"bio": "Rust developer"}));
        assert!(ProfileUpdate::default().is_empty());
    }

    #[test]
    fn test_new_account_omits_missing_bio() {
        let account = NewAccount {
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "pw".into(),
            bio: None,
        };
        let json = serde_json::to_value(&account).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"username": "bob", "email": "bob@example.com", "password": "pw"})
        );
    }
}
