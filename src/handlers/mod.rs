pub mod auth;
pub mod whitelist;
