use serde::{Deserialize, Deserializer, Serialize};

/// Identity returned by `GET /user/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "userId", deserialize_with = "string_or_number")]
    pub user_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "userNickname", default)]
    pub user_nickname: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.user_nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.user_email)
    }
}

/// Access/refresh pair issued by login and refresh.
///
/// The login endpoint has answered with both `access`/`refresh` and
/// `accessToken`/`refreshToken`, so both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken", alias = "access")]
    pub access_token: String,
    #[serde(rename = "refreshToken", alias = "refresh")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_profile() {
        let json = r#"{"userId": 42, "userEmail": "kim@example.com", "userNickname": "kim"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("profile");
        assert_eq!(user.user_id, "42");
        assert_eq!(user.display_name(), "kim");

        let json = r#"{"userId": "u-7", "userEmail": "lee@example.com"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("profile");
        assert_eq!(user.user_id, "u-7");
        assert_eq!(user.display_name(), "lee@example.com");
    }

    #[test]
    fn test_token_pair_accepts_both_namings() {
        let short: TokenPair =
            serde_json::from_str(r#"{"access": "a", "refresh": "r"}"#).expect("short names");
        let long: TokenPair = serde_json::from_str(r#"{"accessToken": "a", "refreshToken": "r"}"#)
            .expect("long names");
        assert_eq!(short, long);
    }

    #[test]
    fn test_refresh_request_wire_name() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "r" }).expect("json");
        assert_eq!(body, serde_json::json!({ "refreshToken": "r" }));
    }
}
