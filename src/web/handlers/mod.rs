pub mod oauth;
pub mod session;
pub mod wallet;
