use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const ENV_SANDBOX: &str = "sandbox";
pub const ENV_PRODUCTION: &str = "production";

/// A registered developer-portal application. Read-only to the
/// authorization flow; registration lives elsewhere in the platform.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::applications)]
pub struct DeveloperApplication {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub allowed_scopes: String,
    pub requested_scopes: String,
    pub environment: String,
    pub is_approved: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl DeveloperApplication {
    /// Sandbox apps may run the flow before global approval.
    pub fn may_authorize(&self) -> bool {
        self.is_approved == 1 || self.environment == ENV_SANDBOX
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::application_redirect_uris)]
pub struct ApplicationRedirectUri {
    pub id: String,
    pub application_id: String,
    pub redirect_uri: String,
    pub created_at: String,
}
