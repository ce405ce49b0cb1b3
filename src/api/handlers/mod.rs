//! HTTP handlers: health plus the `/v1/auth` token endpoints.

pub mod auth;
pub mod health;
