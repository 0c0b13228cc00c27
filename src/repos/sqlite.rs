use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::OptionalExtension;

use crate::models::{
    application::{ApplicationRedirectUri, DeveloperApplication},
    audit::AuditEvent,
    authorization_code::AuthorizationCode,
    notification::Notification,
    profile::Profile,
    user_authorization::UserAuthorization,
    wallet::{Currency, NewWallet, Wallet},
    wallet_transaction::{WalletTransaction, STATUS_COMPLETED},
};
use crate::repos::{
    NewAuthorizationCodeParams, NewNotificationParams, NewWalletParams, Store, TransferCommand,
    TransferOutcome, TransferRejection, Trust,
};
use crate::schema::{
    achievements, application_redirect_uris, applications, audit_events, authorization_codes,
    notifications, profiles, user_authorizations, wallet_transactions, wallets,
};

pub struct SqliteStore {
    pool: crate::db::SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: crate::db::SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc().to_string())
}

fn ensure_owner(trust: &Trust, owner_user_id: &str) -> anyhow::Result<()> {
    if trust.permits(owner_user_id) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("access denied for user-scoped storage call"))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_wallet(&self, trust: &Trust, params: NewWalletParams) -> anyhow::Result<Wallet> {
        ensure_owner(trust, &params.user_id)?;
        let pool = self.pool.clone();
        let wallet = tokio::task::spawn_blocking(move || -> anyhow::Result<Wallet> {
            let mut conn = pool.get()?;
            let id = uuid::Uuid::new_v4().to_string();
            let now = now_rfc3339();
            diesel::insert_into(wallets::table)
                .values(&NewWallet {
                    id: &id,
                    user_id: &params.user_id,
                    address: &params.address,
                    tag: &params.tag,
                    gem_balance: 0,
                    fluxon_balance: 0.0,
                    password_hash: &params.password_hash,
                    password_salt: None,
                    gem_daily_limit: params.gem_daily_limit,
                    fluxon_daily_limit: params.fluxon_daily_limit,
                    created_at: &now,
                    updated_at: &now,
                })
                .execute(&mut conn)?;
            let w = wallets::table.find(&id).first::<Wallet>(&mut conn)?;
            Ok(w)
        })
        .await??;
        Ok(wallet)
    }

    async fn wallet_for_user(&self, trust: &Trust, user_id: &str) -> anyhow::Result<Option<Wallet>> {
        ensure_owner(trust, user_id)?;
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Wallet>> {
            let mut conn = pool.get()?;
            use wallets::dsl as w;
            let found = w::wallets
                .filter(w::user_id.eq(&user_id))
                .first::<Wallet>(&mut conn)
                .optional()?;
            Ok(found)
        })
        .await??;
        Ok(res)
    }

    async fn wallet_by_tag(&self, trust: &Trust, tag: &str) -> anyhow::Result<Option<Wallet>> {
        let tag = tag.to_string();
        let trust = trust.clone();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Wallet>> {
            let mut conn = pool.get()?;
            use wallets::dsl as w;
            let found = w::wallets
                .filter(w::tag.eq(&tag))
                .first::<Wallet>(&mut conn)
                .optional()?;
            Ok(found.filter(|wallet| trust.permits(&wallet.user_id)))
        })
        .await??;
        Ok(res)
    }

    async fn wallet_by_address(&self, trust: &Trust, address: &str) -> anyhow::Result<Option<Wallet>> {
        let address = address.to_string();
        let trust = trust.clone();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Wallet>> {
            let mut conn = pool.get()?;
            use wallets::dsl as w;
            let found = w::wallets
                .filter(w::address.eq(&address))
                .first::<Wallet>(&mut conn)
                .optional()?;
            Ok(found.filter(|wallet| trust.permits(&wallet.user_id)))
        })
        .await??;
        Ok(res)
    }

    async fn record_failed_password(&self, wallet_id: &str) -> anyhow::Result<()> {
        let wallet_id = wallet_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            use wallets::dsl as w;
            diesel::update(w::wallets.find(&wallet_id))
                .set((
                    w::failed_password_attempts.eq(w::failed_password_attempts + 1),
                    w::updated_at.eq(now_rfc3339()),
                ))
                .execute(&mut conn)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn execute_transfer(&self, cmd: TransferCommand) -> anyhow::Result<TransferOutcome> {
        let pool = self.pool.clone();
        let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<TransferOutcome> {
            let mut conn = pool.get()?;
            conn.immediate_transaction(|conn| {
                use wallet_transactions::dsl as wt;
                use wallets::dsl as w;

                // Retried request: hand back the prior ledger row untouched.
                if let Some(request_id) = cmd.request_id.as_deref() {
                    let existing = wt::wallet_transactions
                        .filter(wt::request_id.eq(request_id))
                        .first::<WalletTransaction>(conn)
                        .optional()?;
                    if let Some(transaction) = existing {
                        return Ok(TransferOutcome::Duplicate { transaction });
                    }
                }

                // Re-read under the write lock; the caller's checks were
                // advisory only.
                let sender = w::wallets
                    .find(&cmd.sender_wallet_id)
                    .first::<Wallet>(conn)?;
                if sender.is_locked != 0 {
                    return Ok(TransferOutcome::Rejected(TransferRejection::WalletLocked));
                }

                let now = now_rfc3339();
                match cmd.currency {
                    Currency::MindGems => {
                        let amount = cmd.amount as i64;
                        if sender.gem_balance < amount {
                            return Ok(TransferOutcome::Rejected(
                                TransferRejection::InsufficientFunds,
                            ));
                        }
                        if sender.gem_daily_spent + amount > sender.gem_daily_limit {
                            return Ok(TransferOutcome::Rejected(
                                TransferRejection::DailyLimitExceeded,
                            ));
                        }
                        diesel::update(w::wallets.find(&cmd.sender_wallet_id))
                            .set((
                                w::gem_balance.eq(w::gem_balance - amount),
                                w::gem_daily_spent.eq(w::gem_daily_spent + amount),
                                w::updated_at.eq(&now),
                            ))
                            .execute(conn)?;
                        diesel::update(w::wallets.find(&cmd.recipient_wallet_id))
                            .set((
                                w::gem_balance.eq(w::gem_balance + amount),
                                w::updated_at.eq(&now),
                            ))
                            .execute(conn)?;
                    }
                    Currency::Fluxon => {
                        if sender.fluxon_balance < cmd.amount {
                            return Ok(TransferOutcome::Rejected(
                                TransferRejection::InsufficientFunds,
                            ));
                        }
                        if sender.fluxon_daily_spent + cmd.amount > sender.fluxon_daily_limit {
                            return Ok(TransferOutcome::Rejected(
                                TransferRejection::DailyLimitExceeded,
                            ));
                        }
                        diesel::update(w::wallets.find(&cmd.sender_wallet_id))
                            .set((
                                w::fluxon_balance.eq(w::fluxon_balance - cmd.amount),
                                w::fluxon_daily_spent.eq(w::fluxon_daily_spent + cmd.amount),
                                w::updated_at.eq(&now),
                            ))
                            .execute(conn)?;
                        diesel::update(w::wallets.find(&cmd.recipient_wallet_id))
                            .set((
                                w::fluxon_balance.eq(w::fluxon_balance + cmd.amount),
                                w::updated_at.eq(&now),
                            ))
                            .execute(conn)?;
                    }
                }

                let transaction = WalletTransaction {
                    id: uuid::Uuid::new_v4().to_string(),
                    tx_hash: cmd.tx_hash.clone(),
                    request_id: cmd.request_id.clone(),
                    sender_wallet_id: cmd.sender_wallet_id.clone(),
                    recipient_wallet_id: cmd.recipient_wallet_id.clone(),
                    currency: cmd.currency.as_str().to_string(),
                    amount: cmd.amount,
                    memo: cmd.memo.clone(),
                    status: STATUS_COMPLETED.to_string(),
                    created_at: now,
                };
                diesel::insert_into(wt::wallet_transactions)
                    .values(&transaction)
                    .execute(conn)?;

                let sender_after = w::wallets
                    .find(&cmd.sender_wallet_id)
                    .first::<Wallet>(conn)?;
                let recipient_after = w::wallets
                    .find(&cmd.recipient_wallet_id)
                    .first::<Wallet>(conn)?;
                Ok(TransferOutcome::Completed {
                    transaction,
                    sender_balance: sender_after.balance(cmd.currency),
                    recipient_balance: recipient_after.balance(cmd.currency),
                })
            })
        })
        .await??;
        Ok(outcome)
    }

    async fn transactions_for_wallet(
        &self,
        trust: &Trust,
        wallet_id: &str,
    ) -> anyhow::Result<Vec<WalletTransaction>> {
        let wallet_id = wallet_id.to_string();
        let trust = trust.clone();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<WalletTransaction>> {
            let mut conn = pool.get()?;
            use wallet_transactions::dsl as wt;
            let wallet = wallets::table.find(&wallet_id).first::<Wallet>(&mut conn)?;
            ensure_owner(&trust, &wallet.user_id)?;
            let list = wt::wallet_transactions
                .filter(
                    wt::sender_wallet_id
                        .eq(&wallet_id)
                        .or(wt::recipient_wallet_id.eq(&wallet_id)),
                )
                .order(wt::created_at.desc())
                .load::<WalletTransaction>(&mut conn)?;
            Ok(list)
        })
        .await??;
        Ok(res)
    }

    async fn count_completed_sent(&self, wallet_id: &str) -> anyhow::Result<i64> {
        let wallet_id = wallet_id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<i64> {
            let mut conn = pool.get()?;
            use wallet_transactions::dsl as wt;
            let n = wt::wallet_transactions
                .filter(wt::sender_wallet_id.eq(&wallet_id))
                .filter(wt::status.eq(STATUS_COMPLETED))
                .count()
                .get_result::<i64>(&mut conn)?;
            Ok(n)
        })
        .await??;
        Ok(res)
    }

    async fn get_application(&self, id: &str) -> anyhow::Result<Option<DeveloperApplication>> {
        let id = id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<DeveloperApplication>> {
            let mut conn = pool.get()?;
            let app = applications::table
                .find(&id)
                .first::<DeveloperApplication>(&mut conn)
                .optional()?;
            Ok(app)
        })
        .await??;
        Ok(res)
    }

    async fn list_redirect_uris(
        &self,
        application_id: &str,
    ) -> anyhow::Result<Vec<ApplicationRedirectUri>> {
        let application_id = application_id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<ApplicationRedirectUri>> {
            let mut conn = pool.get()?;
            use application_redirect_uris::dsl as ru;
            let list = ru::application_redirect_uris
                .filter(ru::application_id.eq(&application_id))
                .order(ru::created_at.asc())
                .load::<ApplicationRedirectUri>(&mut conn)?;
            Ok(list)
        })
        .await??;
        Ok(res)
    }

    async fn get_user_authorization(
        &self,
        user_id: &str,
        application_id: &str,
    ) -> anyhow::Result<Option<UserAuthorization>> {
        let user_id = user_id.to_string();
        let application_id = application_id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<UserAuthorization>> {
            let mut conn = pool.get()?;
            use user_authorizations::dsl as ua;
            let grant = ua::user_authorizations
                .filter(ua::user_id.eq(&user_id))
                .filter(ua::application_id.eq(&application_id))
                .first::<UserAuthorization>(&mut conn)
                .optional()?;
            Ok(grant)
        })
        .await??;
        Ok(res)
    }

    async fn upsert_user_authorization(
        &self,
        user_id: &str,
        application_id: &str,
        scopes: &[String],
    ) -> anyhow::Result<UserAuthorization> {
        let user_id = user_id.to_string();
        let application_id = application_id.to_string();
        let scopes: Vec<String> = scopes.to_vec();
        let pool = self.pool.clone();
        let grant = tokio::task::spawn_blocking(move || -> anyhow::Result<UserAuthorization> {
            let mut conn = pool.get()?;
            use user_authorizations::dsl as ua;
            conn.immediate_transaction(|conn| {
                let existing = ua::user_authorizations
                    .filter(ua::user_id.eq(&user_id))
                    .filter(ua::application_id.eq(&application_id))
                    .first::<UserAuthorization>(conn)
                    .optional()?;
                let now = now_rfc3339();
                match existing {
                    Some(grant) => {
                        // Merge: union of previously granted and new scopes.
                        let mut set: std::collections::BTreeSet<String> = grant
                            .scopes
                            .split_whitespace()
                            .map(|s| s.to_string())
                            .collect();
                        set.extend(scopes.iter().cloned());
                        let merged = set.into_iter().collect::<Vec<_>>().join(" ");
                        diesel::update(ua::user_authorizations.find(&grant.id))
                            .set((ua::scopes.eq(&merged), ua::updated_at.eq(&now)))
                            .execute(conn)?;
                        let updated = ua::user_authorizations
                            .find(&grant.id)
                            .first::<UserAuthorization>(conn)?;
                        Ok(updated)
                    }
                    None => {
                        let grant = UserAuthorization {
                            id: uuid::Uuid::new_v4().to_string(),
                            user_id: user_id.clone(),
                            application_id: application_id.clone(),
                            scopes: scopes.join(" "),
                            created_at: now.clone(),
                            updated_at: now,
                        };
                        diesel::insert_into(ua::user_authorizations)
                            .values(&grant)
                            .execute(conn)?;
                        Ok(grant)
                    }
                }
            })
        })
        .await??;
        Ok(grant)
    }

    async fn create_authorization_code(
        &self,
        params: NewAuthorizationCodeParams,
    ) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            let row = AuthorizationCode {
                code: params.code,
                application_id: params.application_id,
                user_id: params.user_id,
                redirect_uri: params.redirect_uri,
                scopes: params.scopes,
                code_challenge: params.code_challenge,
                code_challenge_method: params.code_challenge_method,
                expires_at: params.expires_at,
                created_at: now_rfc3339(),
                consumed_at: None,
            };
            diesel::insert_into(authorization_codes::table)
                .values(&row)
                .execute(&mut conn)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn get_authorization_code(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>> {
        let code = code.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<AuthorizationCode>> {
            let mut conn = pool.get()?;
            let row = authorization_codes::table
                .find(&code)
                .first::<AuthorizationCode>(&mut conn)
                .optional()?;
            Ok(row)
        })
        .await??;
        Ok(res)
    }

    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<Profile>> {
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        let res = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Profile>> {
            let mut conn = pool.get()?;
            let profile = profiles::table
                .find(&user_id)
                .first::<Profile>(&mut conn)
                .optional()?;
            Ok(profile)
        })
        .await??;
        Ok(res)
    }

    async fn mirror_profile_gems(
        &self,
        trust: &Trust,
        user_id: &str,
        gem_balance: i64,
    ) -> anyhow::Result<()> {
        ensure_owner(trust, user_id)?;
        let user_id = user_id.to_string();
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            use profiles::dsl as p;
            let now = now_rfc3339();
            let updated = diesel::update(p::profiles.find(&user_id))
                .set((p::gem_balance.eq(gem_balance), p::updated_at.eq(&now)))
                .execute(&mut conn)?;
            if updated == 0 {
                diesel::insert_into(p::profiles)
                    .values(&Profile {
                        user_id: user_id.clone(),
                        display_name: None,
                        gem_balance,
                        updated_at: now,
                    })
                    .execute(&mut conn)?;
            }
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn insert_notification(
        &self,
        trust: &Trust,
        params: NewNotificationParams,
    ) -> anyhow::Result<Notification> {
        ensure_owner(trust, &params.user_id)?;
        let pool = self.pool.clone();
        let notification = tokio::task::spawn_blocking(move || -> anyhow::Result<Notification> {
            let mut conn = pool.get()?;
            let n = Notification {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: params.user_id,
                kind: params.kind,
                title: params.title,
                body: params.body,
                is_read: 0,
                created_at: now_rfc3339(),
            };
            diesel::insert_into(notifications::table)
                .values(&n)
                .execute(&mut conn)?;
            Ok(n)
        })
        .await??;
        Ok(notification)
    }

    async fn append_audit(&self, event: AuditEvent) -> anyhow::Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            diesel::insert_into(audit_events::table)
                .values(&event)
                .execute(&mut conn)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn award_achievement(
        &self,
        trust: &Trust,
        user_id: &str,
        badge: &str,
    ) -> anyhow::Result<bool> {
        ensure_owner(trust, user_id)?;
        let user_id = user_id.to_string();
        let badge = badge.to_string();
        let pool = self.pool.clone();
        let awarded = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let mut conn = pool.get()?;
            use crate::models::achievement::Achievement;
            let inserted = diesel::insert_or_ignore_into(achievements::table)
                .values(&Achievement {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id,
                    badge,
                    created_at: now_rfc3339(),
                })
                .execute(&mut conn)?;
            Ok(inserted > 0)
        })
        .await??;
        Ok(awarded)
    }
}
