pub mod achievement;
pub mod application;
pub mod audit;
pub mod authorization_code;
pub mod notification;
pub mod profile;
pub mod user_authorization;
pub mod wallet;
pub mod wallet_transaction;
