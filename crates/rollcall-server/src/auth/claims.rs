//! Claim sets carried by a captured check-in payload.

use serde::{Deserialize, Serialize};

/// Claims signed into a check-in token.
///
/// `exp` bounds the scan window only; verification deliberately ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinClaims {
    pub event_id: String,
    /// The event's shared secret at mint time.
    #[serde(rename = "host_secret")]
    pub host_secret_echo: String,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub scan_expiry: i64,
}

/// Unsigned proof used by devices that predate signed tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyProof {
    pub event_id: String,
    pub host_secret: String,
    /// Unix seconds at capture time.
    pub timestamp: i64,
}

/// Proof of presence extracted from a captured payload, after the
/// payload-specific checks (signature, or staleness for legacy) have passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    Signed(CheckinClaims),
    Legacy(LegacyProof),
}

impl Proof {
    pub fn event_id(&self) -> &str {
        match self {
            Self::Signed(claims) => &claims.event_id,
            Self::Legacy(legacy) => &legacy.event_id,
        }
    }

    pub fn host_secret(&self) -> &str {
        match self {
            Self::Signed(claims) => &claims.host_secret_echo,
            Self::Legacy(legacy) => &legacy.host_secret,
        }
    }

    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Signed(_) => "signed",
            Self::Legacy(_) => "legacy",
        }
    }
}
