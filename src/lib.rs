pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod effects;
pub mod limits;
pub mod models;
pub mod oauth;
pub mod repos;
pub mod schema;
pub mod security;
pub mod wallet;
pub mod web;
