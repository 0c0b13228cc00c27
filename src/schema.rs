diesel::table! {
    wallets (id) {
        id -> Text,
        user_id -> Text,
        address -> Text,
        tag -> Text,
        gem_balance -> BigInt,
        fluxon_balance -> Double,
        password_hash -> Text,
        password_salt -> Nullable<Text>,
        gem_daily_spent -> BigInt,
        gem_daily_limit -> BigInt,
        fluxon_daily_spent -> Double,
        fluxon_daily_limit -> Double,
        is_locked -> Integer,
        failed_password_attempts -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    wallet_transactions (id) {
        id -> Text,
        tx_hash -> Text,
        request_id -> Nullable<Text>,
        sender_wallet_id -> Text,
        recipient_wallet_id -> Text,
        currency -> Text,
        amount -> Double,
        memo -> Text,
        status -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    applications (id) {
        id -> Text,
        owner_user_id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        allowed_scopes -> Text,
        requested_scopes -> Text,
        environment -> Text,
        is_approved -> Integer,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    application_redirect_uris (id) {
        id -> Text,
        application_id -> Text,
        redirect_uri -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    authorization_codes (code) {
        code -> Text,
        application_id -> Text,
        user_id -> Text,
        redirect_uri -> Text,
        scopes -> Text,
        code_challenge -> Nullable<Text>,
        code_challenge_method -> Nullable<Text>,
        expires_at -> Text,
        created_at -> Text,
        consumed_at -> Nullable<Text>,
    }
}

diesel::table! {
    user_authorizations (id) {
        id -> Text,
        user_id -> Text,
        application_id -> Text,
        scopes -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    profiles (user_id) {
        user_id -> Text,
        display_name -> Nullable<Text>,
        gem_balance -> BigInt,
        updated_at -> Text,
    }
}

diesel::table! {
    audit_events (id) {
        id -> Text,
        user_id -> Nullable<Text>,
        event_type -> Text,
        detail -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    notifications (id) {
        id -> Text,
        user_id -> Text,
        kind -> Text,
        title -> Text,
        body -> Text,
        is_read -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    achievements (id) {
        id -> Text,
        user_id -> Text,
        badge -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(application_redirect_uris -> applications (application_id));
diesel::joinable!(authorization_codes -> applications (application_id));
diesel::joinable!(user_authorizations -> applications (application_id));

diesel::allow_tables_to_appear_in_same_query!(
    applications,
    application_redirect_uris,
    authorization_codes,
    user_authorizations,
);
