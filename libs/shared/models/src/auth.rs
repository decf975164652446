use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::StaffRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Staff role lives in `app_metadata.staff_role`; the top-level `role` claim is a fallback.
    pub fn staff_role(&self) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|m| m.get("staff_role"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.role.clone())
    }

    pub fn branch_id(&self) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|m| m.get("branch_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn staff_role(&self) -> Option<StaffRole> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }

    pub fn has_role(&self, role: StaffRole) -> bool {
        self.staff_role() == Some(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(StaffRole::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub branch_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StaffProfile {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<StaffRole>,
    pub branch_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(app_metadata: Option<serde_json::Value>, role: Option<&str>) -> JwtClaims {
        JwtClaims {
            sub: "u1".to_string(),
            exp: None,
            email: None,
            role: role.map(str::to_string),
            app_metadata,
            user_metadata: None,
            aud: None,
            iat: None,
        }
    }

    #[test]
    fn staff_role_prefers_app_metadata() {
        let c = claims(Some(json!({"staff_role": "NURSE"})), Some("authenticated"));
        assert_eq!(c.staff_role().as_deref(), Some("NURSE"));
    }

    #[test]
    fn staff_role_falls_back_to_role_claim() {
        let c = claims(None, Some("doctor"));
        assert_eq!(c.staff_role().as_deref(), Some("doctor"));
    }

    #[test]
    fn branch_from_app_metadata() {
        let c = claims(Some(json!({"branch_id": "br-1"})), None);
        assert_eq!(c.branch_id().as_deref(), Some("br-1"));
    }

    #[test]
    fn user_role_parsing() {
        let user = User {
            id: "u".to_string(),
            email: None,
            role: Some("front_desk".to_string()),
            branch_id: None,
            metadata: None,
            created_at: None,
        };
        assert_eq!(user.staff_role(), Some(StaffRole::FrontDesk));
        assert!(!user.is_admin());
    }
}
