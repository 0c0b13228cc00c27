use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Denormalized dashboard row. The wallet flow only mirrors the gem
/// balance into it after a confirmed transfer.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(primary_key(user_id))]
#[diesel(table_name = crate::schema::profiles)]
pub struct Profile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub gem_balance: i64,
    pub updated_at: String,
}
