//! Password hashing.
//!
//! Digests are argon2id PHC strings. Verification recomputes the digest with the
//! stored salt and parameters, then compares the raw outputs in constant time.

use crate::engine::{error::AuthError, model::HashVersion};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

pub const DEFAULT_MEMORY_KIB: u32 = 19_456;
pub const DEFAULT_ITERATIONS: u32 = 2;
pub const DEFAULT_PARALLELISM: u32 = 1;
const OUTPUT_LEN: usize = 32;

/// One-way hashing and constant-time verification of passwords.
///
/// Implementations are CPU bound; async callers should offload them to a
/// blocking worker.
pub trait CredentialHasher: Send + Sync {
    /// # Errors
    /// Returns [`AuthError::Hashing`] if the backend fails to produce a digest.
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// # Errors
    /// Returns [`AuthError::MalformedDigest`] when `digest` cannot be parsed.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError>;

    /// Whether a stored digest was produced with outdated parameters.
    fn needs_rehash(&self, digest: &str, version: HashVersion) -> bool;

    fn current_version(&self) -> HashVersion;
}

#[derive(Clone, Debug)]
pub struct Argon2Hasher {
    params: Params,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2Hasher {
    /// # Errors
    /// Returns [`AuthError::Internal`] when the cost parameters are out of range.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(OUTPUT_LEN))
            .map_err(|err| AuthError::Internal(format!("invalid argon2 params: {err}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::Hashing)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(digest).map_err(|_| AuthError::MalformedDigest)?;
        let params = Params::try_from(&parsed).map_err(|_| AuthError::MalformedDigest)?;
        let expected = parsed.hash.ok_or(AuthError::MalformedDigest)?;
        let salt = parsed.salt.ok_or(AuthError::MalformedDigest)?;
        let algorithm =
            Algorithm::try_from(parsed.algorithm).map_err(|_| AuthError::MalformedDigest)?;
        let version = parsed
            .version
            .map(Version::try_from)
            .transpose()
            .map_err(|_| AuthError::MalformedDigest)?
            .unwrap_or_default();

        let recomputed = Argon2::new(algorithm, version, params.clone())
            .hash_password_customized(
                plaintext.as_bytes(),
                Some(parsed.algorithm),
                parsed.version,
                params,
                salt,
            )
            .map_err(|_| AuthError::Hashing)?;
        let actual = recomputed.hash.ok_or(AuthError::Hashing)?;

        Ok(expected.as_bytes().ct_eq(actual.as_bytes()).into())
    }

    fn needs_rehash(&self, digest: &str, version: HashVersion) -> bool {
        if version != self.current_version() {
            return true;
        }
        let Ok(parsed) = PasswordHash::new(digest) else {
            return true;
        };
        if !matches!(Algorithm::try_from(parsed.algorithm), Ok(Algorithm::Argon2id)) {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }

    fn current_version(&self) -> HashVersion {
        HashVersion::ARGON2ID_V1
    }
}

#[cfg(test)]
pub(crate) fn fast_hasher() -> Argon2Hasher {
    // Minimum argon2 cost keeps unit tests quick.
    Argon2Hasher::new(8, 1, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_password() -> Result<(), AuthError> {
        let hasher = fast_hasher();
        let digest = hasher.hash("correct horse")?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &digest)?);
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_password() -> Result<(), AuthError> {
        let hasher = fast_hasher();
        let digest = hasher.hash("correct horse")?;
        assert!(!hasher.verify("battery staple", &digest)?);
        assert!(!hasher.verify("", &digest)?);
        Ok(())
    }

    #[test]
    fn hash_uses_fresh_salt() -> Result<(), AuthError> {
        let hasher = fast_hasher();
        assert_ne!(hasher.hash("same")?, hasher.hash("same")?);
        Ok(())
    }

    #[test]
    fn malformed_digest_is_reported() {
        let hasher = fast_hasher();
        assert!(matches!(
            hasher.verify("password", "not-a-phc-string"),
            Err(AuthError::MalformedDigest)
        ));
        assert!(matches!(
            hasher.verify("password", "$argon2id$v=19$m=8,t=1,p=1"),
            Err(AuthError::MalformedDigest)
        ));
    }

    #[test]
    fn digests_from_other_parameters_still_verify() -> Result<(), AuthError> {
        let old = Argon2Hasher::new(16, 2, 1)?;
        let digest = old.hash("secret")?;
        let current = fast_hasher();
        assert!(current.verify("secret", &digest)?);
        assert!(current.needs_rehash(&digest, HashVersion::ARGON2ID_V1));
        assert!(!old.needs_rehash(&digest, HashVersion::ARGON2ID_V1));
        Ok(())
    }

    #[test]
    fn outdated_version_needs_rehash() -> Result<(), AuthError> {
        let hasher = fast_hasher();
        let digest = hasher.hash("secret")?;
        assert!(hasher.needs_rehash(&digest, HashVersion(0)));
        assert!(hasher.needs_rehash("garbage", HashVersion::ARGON2ID_V1));
        Ok(())
    }

    #[test]
    fn invalid_cost_parameters_are_rejected() {
        assert!(matches!(
            Argon2Hasher::new(1, 0, 1),
            Err(AuthError::Internal(_))
        ));
    }
}
