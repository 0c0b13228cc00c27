use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// The two wallet currencies. Gems are whole-valued; fluxon is fractional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "mind_gems")]
    MindGems,
    #[serde(rename = "fluxon")]
    Fluxon,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::MindGems => "mind_gems",
            Currency::Fluxon => "fluxon",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::wallets)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub address: String,
    pub tag: String,
    pub gem_balance: i64,
    pub fluxon_balance: f64,
    pub password_hash: String,
    pub password_salt: Option<String>,
    pub gem_daily_spent: i64,
    pub gem_daily_limit: i64,
    pub fluxon_daily_spent: f64,
    pub fluxon_daily_limit: f64,
    pub is_locked: i32,
    pub failed_password_attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Wallet {
    pub fn balance(&self, currency: Currency) -> f64 {
        match currency {
            Currency::MindGems => self.gem_balance as f64,
            Currency::Fluxon => self.fluxon_balance,
        }
    }

    pub fn daily_spent(&self, currency: Currency) -> f64 {
        match currency {
            Currency::MindGems => self.gem_daily_spent as f64,
            Currency::Fluxon => self.fluxon_daily_spent,
        }
    }

    pub fn daily_limit(&self, currency: Currency) -> f64 {
        match currency {
            Currency::MindGems => self.gem_daily_limit as f64,
            Currency::Fluxon => self.fluxon_daily_limit,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::wallets)]
pub struct NewWallet<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub address: &'a str,
    pub tag: &'a str,
    pub gem_balance: i64,
    pub fluxon_balance: f64,
    pub password_hash: &'a str,
    pub password_salt: Option<&'a str>,
    pub gem_daily_limit: i64,
    pub fluxon_daily_limit: f64,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}
