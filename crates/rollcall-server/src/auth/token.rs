//! Check-in token issuance and verification.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rollcall_core::db::unix_timestamp;

use super::claims::{CheckinClaims, LegacyProof};

/// The only algorithm tokens are minted with or accepted under.
const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed check-in token")]
    Malformed,

    #[error("Invalid check-in token signature")]
    BadSignature,

    #[error("Unsupported check-in token algorithm")]
    UnsupportedAlgorithm,

    #[error("Check-in code is stale")]
    StaleLegacy,

    #[error("Token creation failed: {0}")]
    Issue(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::UnsupportedAlgorithm,
            _ => Self::Malformed,
        }
    }
}

/// Mints and verifies HMAC-SHA256 check-in tokens with the server-wide key.
#[derive(Clone)]
pub struct CheckinTokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    scan_window_secs: i64,
}

impl CheckinTokenManager {
    pub fn new(secret: &[u8], scan_window_secs: i64) -> Self {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        // A captured token stays valid proof however long the device is offline.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            scan_window_secs,
        }
    }

    pub const fn scan_window_secs(&self) -> i64 {
        self.scan_window_secs
    }

    /// Issue a token for the event's current secret. Returns the token and
    /// the scan window length in seconds.
    pub fn issue(&self, event_id: &str, host_secret: &str) -> Result<(String, i64), TokenError> {
        self.issue_at(event_id, host_secret, unix_timestamp())
    }

    /// Issue a token as if minted at `issued_at`.
    pub fn issue_at(
        &self,
        event_id: &str,
        host_secret: &str,
        issued_at: i64,
    ) -> Result<(String, i64), TokenError> {
        let claims = CheckinClaims {
            event_id: event_id.to_string(),
            host_secret_echo: host_secret.to_string(),
            issued_at,
            scan_expiry: issued_at + self.scan_window_secs,
        };

        let token = jsonwebtoken::encode(
            &Header::new(TOKEN_ALGORITHM),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Issue(e.to_string()))?;
        Ok((token, self.scan_window_secs))
    }

    /// Verify signature and algorithm and return the claims. The scan expiry
    /// is not checked.
    pub fn verify(&self, token: &str) -> Result<CheckinClaims, TokenError> {
        let data = jsonwebtoken::decode::<CheckinClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

/// Accept a legacy proof only if its capture time is within `max_age_secs`
/// of `now`, in either direction. A timestamp too far away to subtract
/// counts as stale.
pub fn check_legacy_freshness(
    proof: &LegacyProof,
    now: i64,
    max_age_secs: i64,
) -> Result<(), TokenError> {
    match now.checked_sub(proof.timestamp).and_then(i64::checked_abs) {
        Some(age) if age <= max_age_secs => Ok(()),
        _ => Err(TokenError::StaleLegacy),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const SIX_HOURS: i64 = 6 * 60 * 60;
    const SEVEN_DAYS: i64 = 7 * 24 * 60 * 60;

    fn test_tokens() -> CheckinTokenManager {
        CheckinTokenManager::new(b"test-signing-key", SIX_HOURS)
    }

    fn replace_header(token: &str, header_b64: &str) -> String {
        let mut parts = token.splitn(2, '.');
        let _ = parts.next();
        format!("{header_b64}.{}", parts.next().unwrap())
    }

    #[test]
    fn issue_and_verify() {
        let tokens = test_tokens();
        let (token, window) = tokens.issue("e1", "secret-1").unwrap();
        assert_eq!(window, SIX_HOURS);
        assert_eq!(token.split('.').count(), 3);

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.event_id, "e1");
        assert_eq!(claims.host_secret_echo, "secret-1");
        assert_eq!(claims.scan_expiry - claims.issued_at, SIX_HOURS);
    }

    #[test]
    fn expired_scan_window_still_verifies() {
        let tokens = test_tokens();
        let week_ago = unix_timestamp() - SEVEN_DAYS;
        let (token, _) = tokens.issue_at("e1", "secret-1", week_ago).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert!(claims.scan_expiry < unix_timestamp());
        assert_eq!(claims.issued_at, week_ago);
    }

    #[test]
    fn wrong_key_fails_verification() {
        let tokens = test_tokens();
        let other = CheckinTokenManager::new(b"different-key", SIX_HOURS);

        let (token, _) = other.issue("e1", "secret-1").unwrap();
        assert!(matches!(tokens.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn tampered_claims_fail_verification() {
        let tokens = test_tokens();
        let (token, _) = tokens.issue("e1", "secret-1").unwrap();
        let (other, _) = tokens.issue("e2", "secret-2").unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        assert!(matches!(tokens.verify(&spliced), Err(TokenError::BadSignature)));
    }

    #[test]
    fn different_hmac_algorithm_is_rejected() {
        let tokens = test_tokens();
        let claims = CheckinClaims {
            event_id: "e1".into(),
            host_secret_echo: "secret-1".into(),
            issued_at: 0,
            scan_expiry: SIX_HOURS,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"test-signing-key"),
        )
        .unwrap();

        assert!(matches!(
            tokens.verify(&token),
            Err(TokenError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn none_algorithm_is_rejected() {
        let tokens = test_tokens();
        let (token, _) = tokens.issue("e1", "secret-1").unwrap();
        // {"alg":"none","typ":"JWT"}
        let forged = replace_header(&token, "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0");
        assert!(tokens.verify(&forged).is_err());
    }

    #[test]
    fn missing_algorithm_is_rejected() {
        let tokens = test_tokens();
        let (token, _) = tokens.issue("e1", "secret-1").unwrap();
        // {"typ":"JWT"}
        let forged = replace_header(&token, "eyJ0eXAiOiJKV1QifQ");
        assert!(tokens.verify(&forged).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let tokens = test_tokens();
        assert!(matches!(tokens.verify("not-a-token"), Err(TokenError::Malformed)));
        assert!(tokens.verify("").is_err());
    }

    #[test]
    fn legacy_freshness_window() {
        let proof = LegacyProof {
            event_id: "e1".into(),
            host_secret: "secret-1".into(),
            timestamp: 1_000_000,
        };
        let day = 24 * 60 * 60;
        assert!(check_legacy_freshness(&proof, 1_000_000 + day, day).is_ok());
        assert!(matches!(
            check_legacy_freshness(&proof, 1_000_000 + day + 1, day),
            Err(TokenError::StaleLegacy)
        ));
        assert!(check_legacy_freshness(&proof, 1_000_000 - day - 1, day).is_err());
    }

    #[test]
    fn extreme_legacy_timestamps_are_stale() {
        let day = 24 * 60 * 60;
        for timestamp in [i64::MIN, i64::MAX, i64::MIN + 1] {
            let proof = LegacyProof {
                event_id: "e1".into(),
                host_secret: "secret-1".into(),
                timestamp,
            };
            assert!(matches!(
                check_legacy_freshness(&proof, 1_800_000_000, day),
                Err(TokenError::StaleLegacy)
            ));
            assert!(check_legacy_freshness(&proof, -1_800_000_000, day).is_err());
        }
    }
}
