use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id", with = "crate::models::common::uuid_string")]
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub subscription: Subscription,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,

    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
}

impl User {
    /// Every account starts on the Free plan; paid terms are only ever
    /// applied by the ledger's payment-confirmation transition.
    pub fn new(first_name: String, last_name: String, email: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email: email.to_lowercase(),
            role: Role::User,
            subscription: Subscription::free(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Explicitly provisioned administrator account. Registration never
    /// assigns the admin role.
    pub fn admin(email: String) -> Self {
        let mut user = User::new("Site".to_string(), "Administrator".to_string(), email);
        user.role = Role::Admin;
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::PlanCode;

    #[test]
    fn test_new_user_starts_on_free_plan() {
        let user = User::new("Jane".into(), "Doe".into(), "jane@example.com".into());
        assert_eq!(user.role, Role::User);
        assert_eq!(user.subscription.plan, PlanCode::Free);
        assert_eq!(user.subscription.expiry_date, None);
    }

    #[test]
    fn test_email_normalization() {
        let user = User::new("Jane".into(), "Doe".into(), "JANE@EXAMPLE.COM".into());
        assert_eq!(user.email, "jane@example.com");
    }

    #[test]
    fn test_admin_provisioning() {
        let admin = User::admin("admin@example.com".into());
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.subscription.plan, PlanCode::Free);
    }
}
