//! Credential verification and token lifecycle engine.
//!
//! Leaves first: [`hasher`], [`signer`], [`store`], [`rate_limit`]; then
//! [`verifier`] and [`issuer`]; [`orchestrator`] composes them per request.

pub mod accounts;
pub mod config;
pub mod error;
pub mod hasher;
pub mod housekeeping;
pub mod issuer;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod rate_limit;
pub mod secret;
pub mod signer;
pub mod store;
pub mod verifier;

pub use config::AuthConfig;
pub use error::AuthError;
pub use issuer::{RevokedFamily, TokenIssuer};
pub use model::{Identity, Provider, SubjectId, TokenPair, TokenStatus};
pub use orchestrator::{AuthOrchestrator, LoginCredentials, RequestContext};
pub use verifier::CredentialVerifier;
