use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::audit_events)]
pub struct AuditEvent {
    pub id: String,
    pub user_id: Option<String>,
    pub event_type: String,
    pub detail: String,
    pub created_at: String,
}

impl AuditEvent {
    pub fn new(user_id: Option<&str>, event_type: &str, detail: serde_json::Value) -> Self {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| time::OffsetDateTime::now_utc().to_string());
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(|s| s.to_string()),
            event_type: event_type.to_string(),
            detail: detail.to_string(),
            created_at,
        }
    }
}
