use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::AppState;
use crate::models::wallet::Wallet;
use crate::repos::{NewWalletParams, Trust};
use crate::wallet::{
    self, TransferError, TransferRequest, DEFAULT_FLUXON_DAILY_LIMIT, DEFAULT_GEM_DAILY_LIMIT,
    STUDENT_TAG_LEN,
};
use crate::web::session::SessionUser;

/// Tag alphabet avoids the characters students misread over a shoulder.
const TAG_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub id: String,
    pub address: String,
    pub tag: String,
    pub gem_balance: i64,
    pub fluxon_balance: f64,
    pub gem_daily_spent: i64,
    pub gem_daily_limit: i64,
    pub fluxon_daily_spent: f64,
    pub fluxon_daily_limit: f64,
    pub is_locked: bool,
    pub created_at: String,
}

impl From<Wallet> for WalletView {
    fn from(w: Wallet) -> Self {
        WalletView {
            id: w.id,
            address: w.address,
            tag: w.tag,
            gem_balance: w.gem_balance,
            fluxon_balance: w.fluxon_balance,
            gem_daily_spent: w.gem_daily_spent,
            gem_daily_limit: w.gem_daily_limit,
            fluxon_daily_spent: w.fluxon_daily_spent,
            fluxon_daily_limit: w.fluxon_daily_limit,
            is_locked: w.is_locked != 0,
            created_at: w.created_at,
        }
    }
}

pub async fn create_wallet(
    State(state): State<AppState>,
    SessionUser { user_id }: SessionUser,
    Json(body): Json<CreateWalletRequest>,
) -> Response {
    if body.password.len() < 6 || body.password.len() > 64 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Transaction password must be between 6 and 64 characters.",
                "code": "INVALID_PASSWORD_FORMAT",
            })),
        )
            .into_response();
    }

    let trust = Trust::as_user(&user_id);
    match state.store.wallet_for_user(&trust, &user_id).await {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "A wallet already exists for this account.",
                    "code": "WALLET_EXISTS",
                })),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(error) => return internal_error(error),
    }

    let password_hash = match crate::security::hash_password(&body.password) {
        Ok(h) => h,
        Err(error) => return internal_error(error),
    };

    let params = NewWalletParams {
        user_id: user_id.clone(),
        address: format!("cww_{}", crate::security::random_hex(16)),
        tag: generate_tag(),
        password_hash,
        gem_daily_limit: DEFAULT_GEM_DAILY_LIMIT,
        fluxon_daily_limit: DEFAULT_FLUXON_DAILY_LIMIT,
    };
    match state.store.create_wallet(&trust, params).await {
        Ok(wallet) => (
            StatusCode::CREATED,
            Json(json!({ "wallet": WalletView::from(wallet) })),
        )
            .into_response(),
        Err(error) => internal_error(error),
    }
}

pub async fn get_wallet(
    State(state): State<AppState>,
    SessionUser { user_id }: SessionUser,
) -> Response {
    let trust = Trust::as_user(&user_id);
    match state.store.wallet_for_user(&trust, &user_id).await {
        Ok(Some(wallet)) => {
            (StatusCode::OK, Json(json!({ "wallet": WalletView::from(wallet) }))).into_response()
        }
        Ok(None) => wallet_not_found(),
        Err(error) => internal_error(error),
    }
}

pub async fn list_transactions(
    State(state): State<AppState>,
    SessionUser { user_id }: SessionUser,
) -> Response {
    let trust = Trust::as_user(&user_id);
    let wallet = match state.store.wallet_for_user(&trust, &user_id).await {
        Ok(Some(wallet)) => wallet,
        Ok(None) => return wallet_not_found(),
        Err(error) => return internal_error(error),
    };
    match state.store.transactions_for_wallet(&trust, &wallet.id).await {
        Ok(transactions) => {
            (StatusCode::OK, Json(json!({ "transactions": transactions }))).into_response()
        }
        Err(error) => internal_error(error),
    }
}

pub async fn transfer(
    State(state): State<AppState>,
    SessionUser { user_id }: SessionUser,
    Json(body): Json<TransferRequest>,
) -> Response {
    match wallet::transfer(state.store.clone(), state.limiter.as_ref(), &user_id, body).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "transaction": {
                    "id": receipt.transaction.id,
                    "amount": receipt.transaction.amount,
                    "fee": 0,
                    "status": receipt.transaction.status,
                },
            })),
        )
            .into_response(),
        Err(error) => {
            let status = transfer_status(&error);
            (
                status,
                Json(json!({ "error": error.to_string(), "code": error.code() })),
            )
                .into_response()
        }
    }
}

fn transfer_status(error: &TransferError) -> StatusCode {
    match error {
        TransferError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        TransferError::WalletNotFound | TransferError::RecipientNotFound => StatusCode::NOT_FOUND,
        TransferError::InvalidRecipient(_)
        | TransferError::InvalidAmount(_)
        | TransferError::LimitExceeded(_)
        | TransferError::InsufficientBalance
        | TransferError::DailyLimitExceeded => StatusCode::BAD_REQUEST,
        TransferError::InvalidPassword | TransferError::WalletLocked => StatusCode::FORBIDDEN,
        TransferError::TransactionFailed | TransferError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn wallet_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "No wallet found for your account. Create one first via wallet setup.",
            "code": "WALLET_NOT_FOUND",
        })),
    )
        .into_response()
}

fn internal_error(error: anyhow::Error) -> Response {
    tracing::error!(error = ?error, "wallet handler failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal error.", "code": "INTERNAL_ERROR" })),
    )
        .into_response()
}

fn generate_tag() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..STUDENT_TAG_LEN)
        .map(|_| TAG_ALPHABET[rng.gen_range(0..TAG_ALPHABET.len())] as char)
        .collect()
}
