//! # Authkeep (credential verification and token lifecycle)
//!
//! `authkeep` turns a validated identity assertion into a short-lived access
//! token plus a rotating, long-lived refresh token, and governs rotation, reuse
//! detection, and revocation of those refresh tokens.
//!
//! ## Sign-in
//!
//! Two paths lead to an [`engine::Identity`]:
//!
//! - **Password:** the email is normalized and the stored argon2id digest is
//!   verified in constant time. Unknown emails cost the same hashing work and
//!   fail with the same error as wrong passwords.
//! - **Google Sign-In:** the ID token is verified against Google's JWKS, then its
//!   claims (audience, issuer, verified email) are validated and the Google
//!   subject is linked to an internal account, by email on first use.
//!
//! ## Token families
//!
//! Every login starts a refresh-token *family*. Refresh tokens are single use:
//! rotating one marks it `rotated` and issues its successor in a single
//! compare-and-swap. Presenting a rotated or revoked token revokes the whole
//! family and forces a new login. Only SHA-256 hashes of refresh tokens are
//! stored.
//!
//! Access tokens are stateless HS256 JWTs with a `kid` header; they cannot be
//! revoked individually and expire after 15 minutes by default.
//!
//! ## Abuse protection
//!
//! Login, refresh, and logout are rate limited per client address and/or
//! account before any credential work happens. Clients only ever see
//! `Authentication failed` or `Re-authentication required`; the precise reason
//! stays in the logs.

pub mod api;
pub mod cli;
pub mod engine;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
