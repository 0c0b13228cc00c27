use async_trait::async_trait;

use crate::models::{
    application::{ApplicationRedirectUri, DeveloperApplication},
    audit::AuditEvent,
    authorization_code::AuthorizationCode,
    notification::Notification,
    profile::Profile,
    user_authorization::UserAuthorization,
    wallet::{Currency, Wallet},
    wallet_transaction::WalletTransaction,
};

pub mod sqlite;

/// Who a storage call acts as. `User` calls are confined to rows owned by
/// that user; `System` bypasses the ownership check. Threading this through
/// every owner-scoped method keeps privilege escalation visible at the
/// call site instead of implied by which handle is in scope.
#[derive(Debug, Clone)]
pub enum Trust {
    User(String),
    System,
}

impl Trust {
    pub fn as_user(id: &str) -> Self {
        Trust::User(id.to_string())
    }

    pub fn permits(&self, owner_user_id: &str) -> bool {
        match self {
            Trust::System => true,
            Trust::User(id) => id == owner_user_id,
        }
    }
}

/// Input to the atomic transfer primitive. Balance checks inside the
/// primitive are authoritative; the caller's checks only fail fast.
#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub sender_wallet_id: String,
    pub recipient_wallet_id: String,
    pub currency: Currency,
    pub amount: f64,
    pub memo: String,
    pub tx_hash: String,
    pub request_id: Option<String>,
}

#[derive(Debug)]
pub enum TransferOutcome {
    Completed {
        transaction: WalletTransaction,
        sender_balance: f64,
        recipient_balance: f64,
    },
    /// A ledger row with this request id already exists; nothing was mutated.
    Duplicate { transaction: WalletTransaction },
    Rejected(TransferRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRejection {
    InsufficientFunds,
    DailyLimitExceeded,
    WalletLocked,
}

#[derive(Debug, Clone)]
pub struct NewWalletParams {
    pub user_id: String,
    pub address: String,
    pub tag: String,
    pub password_hash: String,
    pub gem_daily_limit: i64,
    pub fluxon_daily_limit: f64,
}

#[derive(Debug, Clone)]
pub struct NewNotificationParams {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewAuthorizationCodeParams {
    pub code: String,
    pub application_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub expires_at: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Wallets
    async fn create_wallet(&self, trust: &Trust, params: NewWalletParams) -> anyhow::Result<Wallet>;
    async fn wallet_for_user(&self, trust: &Trust, user_id: &str) -> anyhow::Result<Option<Wallet>>;
    async fn wallet_by_tag(&self, trust: &Trust, tag: &str) -> anyhow::Result<Option<Wallet>>;
    async fn wallet_by_address(&self, trust: &Trust, address: &str) -> anyhow::Result<Option<Wallet>>;
    async fn record_failed_password(&self, wallet_id: &str) -> anyhow::Result<()>;

    /// The sole mutator of balances. All-or-nothing; see [`TransferOutcome`].
    async fn execute_transfer(&self, cmd: TransferCommand) -> anyhow::Result<TransferOutcome>;

    async fn transactions_for_wallet(
        &self,
        trust: &Trust,
        wallet_id: &str,
    ) -> anyhow::Result<Vec<WalletTransaction>>;
    async fn count_completed_sent(&self, wallet_id: &str) -> anyhow::Result<i64>;

    // Developer portal / OAuth
    async fn get_application(&self, id: &str) -> anyhow::Result<Option<DeveloperApplication>>;
    async fn list_redirect_uris(
        &self,
        application_id: &str,
    ) -> anyhow::Result<Vec<ApplicationRedirectUri>>;
    async fn get_user_authorization(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> anyhow::Result<Option<UserAuthorization>>;
    async fn upsert_user_authorization(
        &self,
        user_id: &str,
        application_id: &str,
        scopes: &[String],
    ) -> anyhow::Result<UserAuthorization>;
    async fn create_authorization_code(
        &self,
        params: NewAuthorizationCodeParams,
    ) -> anyhow::Result<()>;
    async fn get_authorization_code(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>>;

    // Profiles and sinks
    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<Profile>>;
    async fn mirror_profile_gems(
        &self,
        trust: &Trust,
        user_id: &str,
        gem_balance: i64,
    ) -> anyhow::Result<()>;
    async fn insert_notification(
        &self,
        trust: &Trust,
        params: NewNotificationParams,
    ) -> anyhow::Result<Notification>;
    async fn append_audit(&self, event: AuditEvent) -> anyhow::Result<()>;
    /// Returns true when the badge was newly awarded.
    async fn award_achievement(
        &self,
        trust: &Trust,
        user_id: &str,
        badge: &str,
    ) -> anyhow::Result<bool>;
}
