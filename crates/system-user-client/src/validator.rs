//! Token validator.
//!
//! The security core of the exchange. Validation is synchronous CPU work;
//! the caller resolves the tenant's [`TenantTrust`] beforehand.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Structure: size limit, three base64url segments, decodable header
//! 2. Key selection: supported algorithm, non-empty key set, `kid` match
//! 3. Signature, against each candidate key
//! 4. `exp` and `nbf` with leeway, then `iat` against the clock skew
//! 5. `iss` and `aud` against the tenant's expected values
//! 6. Claims identity from the verified payload
//!
//! # Security
//!
//! - Nothing in the payload is inspected until a signature has verified;
//!   a forged token reports `InvalidSignature` whatever its claims say
//! - The header `alg` is attacker-controlled, so it is checked against an
//!   allowlist and against the family of every candidate key
//! - Any single failed check rejects the whole token

use crate::claims::ClaimsIdentity;
use crate::keys::{TenantTrust, VerificationKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::{self, JwtHeader, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Algorithms a system user token may be signed with.
const SUPPORTED_ALGORITHMS: [Algorithm; 4] = [
    Algorithm::EdDSA,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
];

/// The specific check a token failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("token exceeds the maximum allowed size")]
    TokenTooLarge,

    #[error("token is not a well-formed JWT")]
    MalformedToken,

    #[error("token signing algorithm '{0}' is not supported")]
    UnsupportedAlgorithm(String),

    #[error("no signing keys are published for the tenant")]
    NoSigningKeys,

    #[error("no tenant signing key matches the token key id")]
    UnknownSigningKey,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token was issued in the future")]
    IssuedInFuture,

    #[error("token issuer does not match the tenant")]
    InvalidIssuer,

    #[error("token audience does not match the tenant")]
    InvalidAudience,

    #[error("token is missing the required '{0}' claim")]
    MissingClaim(String),
}

impl ValidationFailure {
    /// Stable label naming the failed check.
    pub fn check(&self) -> &'static str {
        match self {
            ValidationFailure::TokenTooLarge => "size",
            ValidationFailure::MalformedToken => "structure",
            ValidationFailure::UnsupportedAlgorithm(_) => "algorithm",
            ValidationFailure::NoSigningKeys => "no_keys",
            ValidationFailure::UnknownSigningKey => "unknown_key",
            ValidationFailure::InvalidSignature => "signature",
            ValidationFailure::Expired => "expiry",
            ValidationFailure::NotYetValid => "not_before",
            ValidationFailure::IssuedInFuture => "issued_at",
            ValidationFailure::InvalidIssuer => "issuer",
            ValidationFailure::InvalidAudience => "audience",
            ValidationFailure::MissingClaim(_) => "missing_claim",
        }
    }
}

impl From<JwtValidationError> for ValidationFailure {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge => ValidationFailure::TokenTooLarge,
            JwtValidationError::MalformedToken => ValidationFailure::MalformedToken,
            JwtValidationError::IatTooFarInFuture => ValidationFailure::IssuedInFuture,
        }
    }
}

/// Result of validating one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(ClaimsIdentity),
    Invalid(ValidationFailure),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn claims_identity(&self) -> Option<&ClaimsIdentity> {
        match self {
            ValidationOutcome::Valid(identity) => Some(identity),
            ValidationOutcome::Invalid(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Invalid(failure) => Some(failure),
        }
    }

    /// Bounded label for metrics.
    pub(crate) fn result_label(&self) -> &'static str {
        match self {
            ValidationOutcome::Valid(_) => "valid",
            ValidationOutcome::Invalid(failure) => failure.check(),
        }
    }
}

/// A token whose structure has been checked but nothing verified.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    header: JwtHeader,
    algorithm: Algorithm,
}

impl ParsedToken {
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Verifies system user tokens against a tenant's trust.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    leeway: Duration,
    clock_skew: Duration,
}

impl TokenValidator {
    /// `leeway` applies to `exp` and `nbf`; `clock_skew` bounds `iat`.
    pub fn new(leeway: Duration, clock_skew: Duration) -> Self {
        Self { leeway, clock_skew }
    }

    /// Check the token's structure and header without trusting anything.
    ///
    /// # Errors
    ///
    /// `TokenTooLarge`, `MalformedToken` or `UnsupportedAlgorithm`.
    pub fn parse(&self, token: &str) -> Result<ParsedToken, ValidationFailure> {
        let header = jwt::parse_header(token)?;

        // parse_header guarantees three non-empty segments.
        let mut segments = token.split('.').skip(1);
        for segment in [segments.next(), segments.next()] {
            let decodes = segment.is_some_and(|s| URL_SAFE_NO_PAD.decode(s).is_ok());
            if !decodes {
                tracing::debug!(target: "sysuser.validator", "Token rejected: segment is not base64url");
                return Err(ValidationFailure::MalformedToken);
            }
        }

        let algorithm = header
            .alg
            .parse::<Algorithm>()
            .ok()
            .filter(|alg| SUPPORTED_ALGORITHMS.contains(alg))
            .ok_or_else(|| {
                tracing::debug!(target: "sysuser.validator", alg = %header.alg, "Token rejected: unsupported algorithm");
                ValidationFailure::UnsupportedAlgorithm(header.alg.clone())
            })?;

        Ok(ParsedToken { header, algorithm })
    }

    /// Parse then verify.
    pub fn validate(&self, token: &str, trust: &TenantTrust) -> ValidationOutcome {
        match self.parse(token) {
            Ok(parsed) => self.verify(token, &parsed, trust),
            Err(failure) => ValidationOutcome::Invalid(failure),
        }
    }

    /// Verify a parsed token against the tenant's trust.
    pub fn verify(&self, token: &str, parsed: &ParsedToken, trust: &TenantTrust) -> ValidationOutcome {
        match self.verify_inner(token, parsed, trust) {
            Ok(identity) => ValidationOutcome::Valid(identity),
            Err(failure) => {
                tracing::debug!(
                    target: "sysuser.validator",
                    check = failure.check(),
                    "Token rejected"
                );
                ValidationOutcome::Invalid(failure)
            }
        }
    }

    fn verify_inner(
        &self,
        token: &str,
        parsed: &ParsedToken,
        trust: &TenantTrust,
    ) -> Result<ClaimsIdentity, ValidationFailure> {
        if trust.keys.is_empty() {
            return Err(ValidationFailure::NoSigningKeys);
        }

        let by_kid: Vec<&VerificationKey> = match parsed.kid() {
            Some(kid) => trust.keys.iter().filter(|k| k.kid() == Some(kid)).collect(),
            None => trust.keys.iter().collect(),
        };
        if by_kid.is_empty() {
            return Err(ValidationFailure::UnknownSigningKey);
        }

        let validation = self.signature_and_time_rules(parsed.algorithm);
        let mut payload = None;
        for key in by_kid.into_iter().filter(|k| k.accepts(parsed.algorithm)) {
            match decode::<Map<String, Value>>(token, key.decoding_key(), &validation) {
                Ok(data) => {
                    payload = Some(data.claims);
                    break;
                }
                Err(e) => match map_decode_error(e.kind()) {
                    // Wrong key, try the next candidate.
                    None => continue,
                    Some(failure) => return Err(failure),
                },
            }
        }
        let payload = payload.ok_or(ValidationFailure::InvalidSignature)?;

        if let Some(iat) = payload.get("iat") {
            let iat = iat.as_i64().ok_or(ValidationFailure::MalformedToken)?;
            jwt::validate_iat(iat, self.clock_skew)?;
        }

        match payload.get("iss") {
            None => return Err(ValidationFailure::MissingClaim("iss".to_string())),
            Some(Value::String(iss)) if *iss == trust.issuer => {}
            Some(_) => return Err(ValidationFailure::InvalidIssuer),
        }

        let audience_matches = match payload.get("aud") {
            None => return Err(ValidationFailure::MissingClaim("aud".to_string())),
            Some(Value::String(aud)) => *aud == trust.audience,
            Some(Value::Array(auds)) => auds
                .iter()
                .any(|a| a.as_str() == Some(trust.audience.as_str())),
            Some(_) => false,
        };
        if !audience_matches {
            return Err(ValidationFailure::InvalidAudience);
        }

        Ok(ClaimsIdentity::from_payload(&payload))
    }

    /// Signature plus `exp`/`nbf`. Issuer and audience are checked after
    /// `iat` so that temporal failures are reported first.
    fn signature_and_time_rules(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        validation
    }
}

/// `None` means the signature did not verify with this key.
fn map_decode_error(kind: &ErrorKind) -> Option<ValidationFailure> {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidRsaKey(_) => None,
        ErrorKind::ExpiredSignature => Some(ValidationFailure::Expired),
        ErrorKind::ImmatureSignature => Some(ValidationFailure::NotYetValid),
        ErrorKind::InvalidIssuer => Some(ValidationFailure::InvalidIssuer),
        ErrorKind::InvalidAudience => Some(ValidationFailure::InvalidAudience),
        ErrorKind::MissingRequiredClaim(claim) => Some(ValidationFailure::MissingClaim(claim.clone())),
        _ => Some(ValidationFailure::MalformedToken),
    }
}
