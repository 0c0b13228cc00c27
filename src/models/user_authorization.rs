use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable record of the scopes a user has granted to an application.
/// Upserted with the union of old and new scopes on each consent;
/// never automatically revoked.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::user_authorizations)]
pub struct UserAuthorization {
    pub id: String,
    pub user_id: String,
    pub application_id: String,
    pub scopes: String,
    pub created_at: String,
    pub updated_at: String,
}
