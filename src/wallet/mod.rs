use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::effects::fire_and_forget;
use crate::limits::{RateLimiter, WALLET_BUCKET};
use crate::models::audit::AuditEvent;
use crate::models::wallet::{Currency, Wallet};
use crate::models::wallet_transaction::WalletTransaction;
use crate::repos::{
    NewNotificationParams, Store, TransferCommand, TransferOutcome, TransferRejection, Trust,
};
use crate::security::{random_hex, StoredPassword};

/// Hard per-transaction ceilings, independent of any wallet's daily limit.
pub const GEM_TRANSFER_CEILING: i64 = 10_000;
pub const FLUXON_TRANSFER_CEILING: f64 = 1_000.0;

pub const STUDENT_TAG_LEN: usize = 12;

pub const DEFAULT_GEM_DAILY_LIMIT: i64 = 500;
pub const DEFAULT_FLUXON_DAILY_LIMIT: f64 = 100.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub to_address: Option<String>,
    pub to_student_tag: Option<String>,
    pub amount: f64,
    pub currency_type: Currency,
    pub memo: Option<String>,
    pub password: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Too many transfer attempts. Try again shortly.")]
    RateLimited,
    #[error("No wallet found for your account. Create one first via wallet setup.")]
    WalletNotFound,
    #[error("Recipient wallet not found.")]
    RecipientNotFound,
    #[error("{0}")]
    InvalidRecipient(String),
    #[error("{0}")]
    InvalidAmount(String),
    #[error("{0}")]
    LimitExceeded(String),
    #[error("Incorrect transaction password.")]
    InvalidPassword,
    #[error("This wallet is locked.")]
    WalletLocked,
    #[error("Insufficient balance for this transfer.")]
    InsufficientBalance,
    #[error("This transfer exceeds the daily spending limit.")]
    DailyLimitExceeded,
    #[error("Transaction failed.")]
    TransactionFailed,
    #[error("Internal error.")]
    Internal(anyhow::Error),
}

impl TransferError {
    /// Stable machine-readable code for client-side branching.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::RateLimited => "RATE_LIMITED",
            TransferError::WalletNotFound => "WALLET_NOT_FOUND",
            TransferError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            TransferError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            TransferError::InvalidAmount(_) => "INVALID_AMOUNT",
            TransferError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            TransferError::InvalidPassword => "INVALID_PASSWORD",
            TransferError::WalletLocked => "WALLET_LOCKED",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::DailyLimitExceeded => "DAILY_LIMIT_EXCEEDED",
            TransferError::TransactionFailed => "TRANSACTION_FAILED",
            TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug)]
pub struct TransferReceipt {
    pub transaction: WalletTransaction,
    /// True when the request id matched a prior ledger row and nothing moved.
    pub duplicate: bool,
}

/// Run a peer-to-peer transfer for the authenticated user. Validation runs
/// first and fails fast; the balance mutation itself is delegated entirely
/// to the store's atomic primitive; side effects follow and are best-effort.
pub async fn transfer(
    store: Arc<dyn Store>,
    limiter: &dyn RateLimiter,
    user_id: &str,
    req: TransferRequest,
) -> Result<TransferReceipt, TransferError> {
    let result = transfer_inner(store.clone(), limiter, user_id, req).await;
    if let Err(error) = &result {
        let event = AuditEvent::new(
            Some(user_id),
            "wallet.transfer.failed",
            json!({ "code": error.code() }),
        );
        let store = store.clone();
        fire_and_forget("wallet.audit.failure", async move {
            store.append_audit(event).await
        });
    }
    result
}

async fn transfer_inner(
    store: Arc<dyn Store>,
    limiter: &dyn RateLimiter,
    user_id: &str,
    req: TransferRequest,
) -> Result<TransferReceipt, TransferError> {
    if !limiter.check(user_id, WALLET_BUCKET) {
        return Err(TransferError::RateLimited);
    }

    let trust = Trust::as_user(user_id);
    let sender = store
        .wallet_for_user(&trust, user_id)
        .await
        .map_err(TransferError::Internal)?
        .ok_or(TransferError::WalletNotFound)?;

    let recipient = resolve_recipient(store.as_ref(), &req).await?;
    if recipient.id == sender.id {
        return Err(TransferError::InvalidRecipient(
            "You cannot transfer to your own wallet.".to_string(),
        ));
    }

    validate_amount(req.currency_type, req.amount)?;

    let memo = strip_html(req.memo.as_deref().unwrap_or(""));

    let stored = StoredPassword::classify(&sender.password_hash, sender.password_salt.as_deref());
    if !stored.verify(&req.password) {
        if let Err(error) = store.record_failed_password(&sender.id).await {
            tracing::warn!(error = ?error, wallet = %sender.id, "failed to record password failure");
        }
        let event = AuditEvent::new(
            Some(user_id),
            "wallet.password.failed",
            json!({ "wallet_id": sender.id }),
        );
        let audit_store = store.clone();
        fire_and_forget("wallet.audit.password", async move {
            audit_store.append_audit(event).await
        });
        return Err(TransferError::InvalidPassword);
    }

    if sender.is_locked != 0 {
        return Err(TransferError::WalletLocked);
    }
    if sender.balance(req.currency_type) < req.amount {
        return Err(TransferError::InsufficientBalance);
    }
    if sender.daily_spent(req.currency_type) + req.amount > sender.daily_limit(req.currency_type) {
        return Err(TransferError::DailyLimitExceeded);
    }

    let cmd = TransferCommand {
        sender_wallet_id: sender.id.clone(),
        recipient_wallet_id: recipient.id.clone(),
        currency: req.currency_type,
        amount: req.amount,
        memo,
        tx_hash: random_hex(32),
        request_id: req.request_id.clone(),
    };
    let outcome = store.execute_transfer(cmd).await.map_err(|error| {
        tracing::error!(error = ?error, "transfer primitive failed");
        TransferError::TransactionFailed
    })?;

    match outcome {
        TransferOutcome::Completed {
            transaction,
            sender_balance,
            recipient_balance,
        } => {
            run_side_effects(
                store,
                user_id,
                &sender,
                &recipient,
                &transaction,
                sender_balance,
                recipient_balance,
            );
            Ok(TransferReceipt { transaction, duplicate: false })
        }
        TransferOutcome::Duplicate { transaction } => {
            Ok(TransferReceipt { transaction, duplicate: true })
        }
        TransferOutcome::Rejected(TransferRejection::InsufficientFunds) => {
            Err(TransferError::InsufficientBalance)
        }
        TransferOutcome::Rejected(TransferRejection::DailyLimitExceeded) => {
            Err(TransferError::DailyLimitExceeded)
        }
        TransferOutcome::Rejected(TransferRejection::WalletLocked) => {
            Err(TransferError::WalletLocked)
        }
    }
}

/// Side effects run only after the financial mutation is confirmed, and
/// none of them may fail the request.
fn run_side_effects(
    store: Arc<dyn Store>,
    user_id: &str,
    sender: &Wallet,
    recipient: &Wallet,
    transaction: &WalletTransaction,
    sender_balance: f64,
    recipient_balance: f64,
) {
    let event = AuditEvent::new(
        Some(user_id),
        "wallet.transfer.completed",
        json!({
            "transaction_id": transaction.id,
            "currency": transaction.currency,
            "amount": transaction.amount,
            "sender_wallet_id": sender.id,
            "recipient_wallet_id": recipient.id,
            "sender_balance": sender_balance,
            "recipient_balance": recipient_balance,
        }),
    );
    let audit_store = store.clone();
    fire_and_forget("wallet.audit.success", async move {
        audit_store.append_audit(event).await
    });

    let notify_store = store.clone();
    let notification = NewNotificationParams {
        user_id: recipient.user_id.clone(),
        kind: "payment_received".to_string(),
        title: "Payment received".to_string(),
        body: format!(
            "You received {} {} from @{}",
            transaction.amount, transaction.currency, sender.tag
        ),
    };
    fire_and_forget("wallet.notify.recipient", async move {
        notify_store
            .insert_notification(&Trust::System, notification)
            .await?;
        Ok(())
    });

    if transaction.currency == Currency::MindGems.as_str() {
        let mirror_store = store.clone();
        let sender_user = sender.user_id.clone();
        let gem_balance = sender_balance as i64;
        fire_and_forget("wallet.profile.mirror", async move {
            mirror_store
                .mirror_profile_gems(&Trust::System, &sender_user, gem_balance)
                .await
        });
    }

    let achievements_store = store;
    let sender_wallet = sender.id.clone();
    let sender_user = sender.user_id.clone();
    fire_and_forget("wallet.achievements", async move {
        let sent = achievements_store.count_completed_sent(&sender_wallet).await?;
        if let Some(badge) = milestone_badge(sent) {
            achievements_store
                .award_achievement(&Trust::System, &sender_user, badge)
                .await?;
        }
        Ok(())
    });
}

fn milestone_badge(completed_sent: i64) -> Option<&'static str> {
    match completed_sent {
        1 => Some("first_transfer"),
        10 => Some("ten_transfers"),
        100 => Some("hundred_transfers"),
        _ => None,
    }
}

async fn resolve_recipient(
    store: &dyn Store,
    req: &TransferRequest,
) -> Result<Wallet, TransferError> {
    // Recipient lookup crosses user boundaries; system trust is deliberate.
    let trust = Trust::System;
    if let Some(tag) = req.to_student_tag.as_deref() {
        if tag.len() != STUDENT_TAG_LEN {
            return Err(TransferError::InvalidRecipient(format!(
                "Student tags are exactly {STUDENT_TAG_LEN} characters."
            )));
        }
        return store
            .wallet_by_tag(&trust, tag)
            .await
            .map_err(TransferError::Internal)?
            .ok_or(TransferError::RecipientNotFound);
    }
    if let Some(address) = req.to_address.as_deref() {
        return store
            .wallet_by_address(&trust, address)
            .await
            .map_err(TransferError::Internal)?
            .ok_or(TransferError::RecipientNotFound);
    }
    Err(TransferError::InvalidRecipient(
        "Provide toStudentTag or toAddress.".to_string(),
    ))
}

fn validate_amount(currency: Currency, amount: f64) -> Result<(), TransferError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(TransferError::InvalidAmount(
            "Transfer amount must be a positive number.".to_string(),
        ));
    }
    match currency {
        Currency::MindGems => {
            if amount.fract() != 0.0 {
                return Err(TransferError::InvalidAmount(
                    "Gem transfers must be whole amounts.".to_string(),
                ));
            }
            if amount > GEM_TRANSFER_CEILING as f64 {
                return Err(TransferError::LimitExceeded(format!(
                    "Gem transfers are capped at {GEM_TRANSFER_CEILING} per transaction."
                )));
            }
        }
        Currency::Fluxon => {
            if amount > FLUXON_TRANSFER_CEILING {
                return Err(TransferError::LimitExceeded(format!(
                    "Fluxon transfers are capped at {FLUXON_TRANSFER_CEILING} per transaction."
                )));
            }
        }
    }
    Ok(())
}

/// Strip HTML tags from a memo before it is persisted. The ledger is
/// rendered verbatim by several dashboards.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(strip_html("<b>lunch</b> money"), "lunch money");
        assert_eq!(
            strip_html("<script>alert('x')</script>thanks"),
            "alert('x')thanks"
        );
        assert_eq!(strip_html("plain memo"), "plain memo");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn strip_html_handles_unclosed_tag() {
        assert_eq!(strip_html("memo <img src=x"), "memo");
    }

    #[test]
    fn gem_amounts_must_be_whole() {
        assert!(validate_amount(Currency::MindGems, 10.0).is_ok());
        assert!(matches!(
            validate_amount(Currency::MindGems, 10.5),
            Err(TransferError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_non_finite_and_non_positive() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0, -3.0] {
            assert!(matches!(
                validate_amount(Currency::Fluxon, bad),
                Err(TransferError::InvalidAmount(_))
            ));
        }
    }

    #[test]
    fn enforces_per_transaction_ceilings() {
        assert!(validate_amount(Currency::MindGems, 10_000.0).is_ok());
        assert!(matches!(
            validate_amount(Currency::MindGems, 10_001.0),
            Err(TransferError::LimitExceeded(_))
        ));
        assert!(validate_amount(Currency::Fluxon, 1_000.0).is_ok());
        assert!(matches!(
            validate_amount(Currency::Fluxon, 1_000.5),
            Err(TransferError::LimitExceeded(_))
        ));
    }

    #[test]
    fn milestone_badges() {
        assert_eq!(milestone_badge(1), Some("first_transfer"));
        assert_eq!(milestone_badge(2), None);
        assert_eq!(milestone_badge(10), Some("ten_transfers"));
        assert_eq!(milestone_badge(100), Some("hundred_transfers"));
    }
}
