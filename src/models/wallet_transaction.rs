use diesel::prelude::*;
use serde::{Deserialize, Serialize};

pub const STATUS_COMPLETED: &str = "completed";

/// Immutable ledger row. Written only by the atomic transfer primitive;
/// never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable)]
#[diesel(table_name = crate::schema::wallet_transactions)]
pub struct WalletTransaction {
    pub id: String,
    pub tx_hash: String,
    pub request_id: Option<String>,
    pub sender_wallet_id: String,
    pub recipient_wallet_id: String,
    pub currency: String,
    pub amount: f64,
    pub memo: String,
    pub status: String,
    pub created_at: String,
}
