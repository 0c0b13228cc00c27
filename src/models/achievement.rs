use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::achievements)]
pub struct Achievement {
    pub id: String,
    pub user_id: String,
    pub badge: String,
    pub created_at: String,
}
