//! `/v1/auth` handlers.
//!
//! Clients only ever see two failure messages: `Authentication failed` for
//! login problems (including throttling, which also carries `Retry-After`) and
//! `Re-authentication required` when a refresh token can no longer be used.
//! The precise reason is logged.

pub(crate) mod error;
pub mod login;
pub mod logout;
pub mod me;
pub mod provider_token;
pub mod refresh;
pub(crate) mod types;
mod utils;
