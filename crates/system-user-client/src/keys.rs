//! Signing key resolution.
//!
//! The validator never fetches keys itself. The client asks a
//! [`KeyResolver`] for the [`TenantTrust`] of the exact subdomain used in
//! the exchange, then hands that trust to the synchronous validator.
//!
//! Two resolvers are provided:
//! - [`StaticKeyResolver`]: fixed keys, for pinned deployments and tests
//! - [`JwksKeyResolver`]: fetches the tenant's JWKS document and caches it
//!   per subdomain with a TTL so key rotation is picked up
//!
//! # Security
//!
//! - Keys are only ever selected from the tenant's own key set; the token's
//!   `kid` header narrows the set but never adds to it
//! - A key is bound to one algorithm family so an RSA key cannot verify an
//!   EdDSA token or the reverse. A JWK that publishes `alg` is further
//!   pinned to exactly that algorithm
//! - When a token names a key the resolved set lacks, the client calls
//!   [`KeyResolver::force_refresh`] once before rejecting it, so rotated
//!   keys are picked up without waiting for the cache TTL

use crate::config::TenantTemplate;
use async_trait::async_trait;
use common::jwt::decode_ed25519_public_key_jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Ed25519 public keys are always 32 bytes.
const ED25519_PUBLIC_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyResolutionError {
    #[error("Signing keys unavailable: {0}")]
    Unavailable(String),

    #[error("Signing key fetch timed out")]
    TimedOut,

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
}

/// Algorithm family a key can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Ed25519,
    Rsa,
}

/// A trusted public key for one tenant.
#[derive(Clone)]
pub struct VerificationKey {
    kid: Option<String>,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Ed25519 key from its raw 32-byte public key.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError::InvalidKey` if the key is not 32 bytes.
    pub fn ed25519(kid: Option<String>, public_key: &[u8]) -> Result<Self, KeyResolutionError> {
        if public_key.len() != ED25519_PUBLIC_KEY_LEN {
            return Err(KeyResolutionError::InvalidKey(format!(
                "Ed25519 public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
                public_key.len()
            )));
        }

        Ok(Self {
            kid,
            family: KeyFamily::Ed25519,
            algorithm: None,
            decoding_key: DecodingKey::from_ed_der(public_key),
        })
    }

    /// RSA key from base64url modulus and exponent.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError::InvalidKey` if the components do not decode.
    pub fn rsa_components(
        kid: Option<String>,
        modulus: &str,
        exponent: &str,
    ) -> Result<Self, KeyResolutionError> {
        let decoding_key = DecodingKey::from_rsa_components(modulus, exponent)
            .map_err(|e| KeyResolutionError::InvalidKey(format!("bad RSA components: {e}")))?;

        Ok(Self {
            kid,
            family: KeyFamily::Rsa,
            algorithm: None,
            decoding_key,
        })
    }

    /// Restrict this key to a single algorithm of its family.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError::InvalidKey` if `alg` belongs to another
    /// family.
    pub fn with_algorithm(mut self, alg: Algorithm) -> Result<Self, KeyResolutionError> {
        if !self.family_accepts(alg) {
            return Err(KeyResolutionError::InvalidKey(format!(
                "{alg:?} cannot be used with a {:?} key",
                self.family
            )));
        }
        self.algorithm = Some(alg);
        Ok(self)
    }

    /// Convert a published JWK. Supports `OKP`/`Ed25519` and `RSA`, and
    /// honours an `alg` member by pinning the key to it.
    ///
    /// # Errors
    ///
    /// Returns `KeyResolutionError::InvalidKey` for unsupported key types,
    /// keys not meant for signatures, an `alg` outside the key's family, or
    /// missing or malformed material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyResolutionError> {
        let key = Self::from_jwk_material(jwk)?;

        match jwk.alg.as_deref() {
            None => Ok(key),
            Some(alg) => {
                let alg = alg.parse::<Algorithm>().map_err(|_| {
                    KeyResolutionError::InvalidKey(format!("unsupported JWK alg '{alg}'"))
                })?;
                key.with_algorithm(alg)
            }
        }
    }

    fn from_jwk_material(jwk: &Jwk) -> Result<Self, KeyResolutionError> {
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(KeyResolutionError::InvalidKey(
                "key is not a signature key".to_string(),
            ));
        }

        match jwk.kty.as_str() {
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(KeyResolutionError::InvalidKey(format!(
                        "unsupported OKP curve {:?}",
                        jwk.crv
                    )));
                }
                let x = jwk
                    .x
                    .as_deref()
                    .ok_or_else(|| KeyResolutionError::InvalidKey("JWK missing x".to_string()))?;
                let public_key = decode_ed25519_public_key_jwk(x)
                    .map_err(|e| KeyResolutionError::InvalidKey(format!("bad x encoding: {e}")))?;
                Self::ed25519(jwk.kid.clone(), &public_key)
            }
            "RSA" => {
                let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                    return Err(KeyResolutionError::InvalidKey(
                        "RSA JWK missing n or e".to_string(),
                    ));
                };
                Self::rsa_components(jwk.kid.clone(), n, e)
            }
            other => Err(KeyResolutionError::InvalidKey(format!(
                "unsupported key type '{other}'"
            ))),
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm this key is pinned to, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether this key can verify tokens signed with `alg`.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family_accepts(alg) && !matches!(self.algorithm, Some(pinned) if pinned != alg)
    }

    fn family_accepts(&self, alg: Algorithm) -> bool {
        match self.family {
            KeyFamily::Ed25519 => alg == Algorithm::EdDSA,
            KeyFamily::Rsa => matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512),
        }
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Everything the validator trusts for one tenant.
#[derive(Debug, Clone)]
pub struct TenantTrust {
    pub keys: Vec<VerificationKey>,
    pub issuer: String,
    pub audience: String,
}

/// Resolves the trust parameters of a tenant.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Keys plus expected issuer and audience for `sub_domain`.
    async fn resolve(&self, sub_domain: &str) -> Result<TenantTrust, KeyResolutionError>;

    /// Resolve `sub_domain` again, bypassing any cache.
    ///
    /// Used once per validation when a token names a key the resolved trust
    /// does not hold.
    async fn force_refresh(&self, sub_domain: &str) -> Result<TenantTrust, KeyResolutionError> {
        self.resolve(sub_domain).await
    }
}

/// Resolver with a fixed key set.
#[derive(Debug, Clone)]
pub struct StaticKeyResolver {
    keys: Vec<VerificationKey>,
    issuer: TenantTemplate,
    audience: TenantTemplate,
}

impl StaticKeyResolver {
    pub fn new(keys: Vec<VerificationKey>, issuer: TenantTemplate, audience: TenantTemplate) -> Self {
        Self {
            keys,
            issuer,
            audience,
        }
    }
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve(&self, sub_domain: &str) -> Result<TenantTrust, KeyResolutionError> {
        Ok(TenantTrust {
            keys: self.keys.clone(),
            issuer: self.issuer.render(sub_domain),
            audience: self.audience.render(sub_domain),
        })
    }
}

/// JSON Web Key as published on the tenant's JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name for OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

struct CachedKeys {
    keys: Vec<VerificationKey>,
    expires_at: Instant,
}

/// Fetches and caches each tenant's JWKS.
///
/// Thread-safe. Each subdomain has its own cache entry so one tenant's keys
/// are never used for another.
pub struct JwksKeyResolver {
    jwks: TenantTemplate,
    issuer: TenantTemplate,
    audience: TenantTemplate,
    http_client: reqwest::Client,
    cache: Arc<RwLock<HashMap<String, CachedKeys>>>,
    cache_ttl: Duration,
}

impl JwksKeyResolver {
    pub fn new(
        jwks: TenantTemplate,
        issuer: TenantTemplate,
        audience: TenantTemplate,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            jwks,
            issuer,
            audience,
            http_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    #[cfg(test)]
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    fn trust(&self, sub_domain: &str, keys: Vec<VerificationKey>) -> TenantTrust {
        TenantTrust {
            keys,
            issuer: self.issuer.render(sub_domain),
            audience: self.audience.render(sub_domain),
        }
    }

    #[instrument(skip(self))]
    async fn fetch(&self, sub_domain: &str) -> Result<Vec<VerificationKey>, KeyResolutionError> {
        let url = self.jwks.render(sub_domain);
        tracing::debug!(target: "sysuser.keys", url = %url, "Fetching tenant JWKS");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(target: "sysuser.keys", "JWKS fetch timed out");
                KeyResolutionError::TimedOut
            } else {
                tracing::error!(target: "sysuser.keys", error = %e, "Failed to fetch JWKS");
                KeyResolutionError::Unavailable(format!("JWKS request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "sysuser.keys",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(KeyResolutionError::Unavailable(format!(
                "JWKS endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return KeyResolutionError::TimedOut;
            }
            tracing::error!(target: "sysuser.keys", error = %e, "Failed to parse JWKS response");
            KeyResolutionError::Unavailable(format!("invalid JWKS document: {e}"))
        })?;

        let keys: Vec<VerificationKey> = jwks
            .keys
            .iter()
            .filter_map(|jwk| match VerificationKey::from_jwk(jwk) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(
                        target: "sysuser.keys",
                        kid = ?jwk.kid,
                        error = %e,
                        "Skipping unusable JWK"
                    );
                    None
                }
            })
            .collect();

        tracing::info!(
            target: "sysuser.keys",
            sub_domain = %sub_domain,
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        cache.insert(
            sub_domain.to_string(),
            CachedKeys {
                keys: keys.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );

        Ok(keys)
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve(&self, sub_domain: &str) -> Result<TenantTrust, KeyResolutionError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(sub_domain) {
                if cached.expires_at > Instant::now() {
                    tracing::debug!(target: "sysuser.keys", sub_domain = %sub_domain, "JWKS cache hit");
                    return Ok(self.trust(sub_domain, cached.keys.clone()));
                }
            }
        }

        let keys = self.fetch(sub_domain).await?;
        Ok(self.trust(sub_domain, keys))
    }

    async fn force_refresh(&self, sub_domain: &str) -> Result<TenantTrust, KeyResolutionError> {
        tracing::debug!(target: "sysuser.keys", sub_domain = %sub_domain, "Forcing JWKS refresh");
        let keys = self.fetch(sub_domain).await?;
        Ok(self.trust(sub_domain, keys))
    }
}

impl fmt::Debug for JwksKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksKeyResolver")
            .field("jwks", &self.jwks)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}
