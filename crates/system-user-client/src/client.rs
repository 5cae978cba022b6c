//! Protocol orchestrator.
//!
//! [`SystemUserClient`] drives one ticket acquisition strictly in order:
//! build request, exchange, resolve the tenant's keys, validate, store the
//! identity, extract the ticket. Nothing is cached between calls and
//! nothing is retried.
//!
//! # Concurrency
//!
//! A client can be shared across tasks. The last validated identity lives
//! in a `tokio::sync::watch` channel: every validation replaces it and the
//! last one to finish wins. Overlapping calls on one client therefore race
//! on [`SystemUserClient::last_claims_identity`]. Callers that need the
//! identity of a specific call should use the identity returned by
//! [`SystemUserClient::validate`] or serialize their calls.

use crate::claims::{ClaimsIdentity, Ticket};
use crate::config::ClientConfig;
use crate::descriptor::SystemUserDescriptor;
use crate::errors::SystemUserError;
use crate::keys::{JwksKeyResolver, KeyResolutionError, KeyResolver};
use crate::observability::metrics;
use crate::request::SystemUserRequest;
use crate::transport::{TokenExchangeResult, Transport, TransportOptions};
use crate::validator::{TokenValidator, ValidationFailure, ValidationOutcome};
use common::secret::ExposeSecret;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Client for acquiring system user tickets for one tenant.
pub struct SystemUserClient {
    descriptor: SystemUserDescriptor,
    config: ClientConfig,
    transport: Transport,
    validator: TokenValidator,
    key_resolver: Arc<dyn KeyResolver>,
    identity: watch::Sender<Option<ClaimsIdentity>>,
}

impl SystemUserClient {
    /// Create a client using the tenant's published JWKS for key resolution.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the ambient proxy is unusable, or
    /// `Transport` if no HTTP client can be built.
    pub fn new(
        descriptor: SystemUserDescriptor,
        config: ClientConfig,
    ) -> Result<Self, SystemUserError> {
        let transport = Transport::new(
            config.http_client.clone(),
            TransportOptions::from_config(&config),
        );
        let key_resolver = JwksKeyResolver::new(
            config.jwks.clone(),
            config.issuer.clone(),
            config.audience.clone(),
            transport.shared_client()?,
        );
        let validator = TokenValidator::new(config.leeway, config.clock_skew);
        let (identity, _) = watch::channel(None);

        tracing::debug!(
            target: "sysuser.client",
            sub_domain = %descriptor.sub_domain(),
            injected_client = config.http_client.is_some(),
            use_default_credentials = config.use_default_credentials,
            "System user client created"
        );

        Ok(Self {
            descriptor,
            config,
            transport,
            validator,
            key_resolver: Arc::new(key_resolver),
            identity,
        })
    }

    /// Replace the key resolver.
    #[must_use]
    pub fn with_key_resolver(mut self, key_resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = key_resolver;
        self
    }

    pub fn descriptor(&self) -> &SystemUserDescriptor {
        &self.descriptor
    }

    /// Perform one exchange without validating the returned token.
    ///
    /// # Errors
    ///
    /// `Transport`, `UnexpectedStatus`, `InvalidResponse` or `Cancelled`. An
    /// endpoint-reported failure is returned as `TokenExchangeResult::Failure`.
    #[instrument(skip_all, fields(sub_domain = %self.descriptor.sub_domain()))]
    pub async fn exchange_for_token(&self) -> Result<TokenExchangeResult, SystemUserError> {
        let request = SystemUserRequest::build(&self.descriptor, &self.config.endpoint)?;
        self.transport.exchange(&request).await
    }

    /// Validate a token for this client's tenant and store the resulting
    /// identity (or its absence).
    ///
    /// # Errors
    ///
    /// `Transport` if the tenant's keys cannot be fetched, `Cancelled` if
    /// the fetch timed out. An invalid token is not an error here.
    #[instrument(skip_all, fields(sub_domain = %self.descriptor.sub_domain()))]
    pub async fn validate(&self, token: &str) -> Result<ValidationOutcome, SystemUserError> {
        self.validate_for(token, self.descriptor.sub_domain()).await
    }

    /// Exchange, validate and extract the ticket.
    ///
    /// Every call performs a fresh exchange.
    ///
    /// # Errors
    ///
    /// - `RemoteRejection` with the endpoint's message verbatim
    /// - `TokenValidation` naming the failed check
    /// - `ProtocolContract` if the validated token carries no ticket
    /// - `Transport`, `UnexpectedStatus`, `InvalidResponse`, `Cancelled`
    #[instrument(skip_all, fields(sub_domain = %self.descriptor.sub_domain()))]
    pub async fn get_system_user_ticket(&self) -> Result<Ticket, SystemUserError> {
        let start = Instant::now();
        let result = self.acquire_ticket().await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome_label(),
        };
        metrics::record_exchange(outcome, start.elapsed());

        result
    }

    /// As [`Self::get_system_user_ticket`], abandoning the call when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token is cancelled first, otherwise as
    /// [`Self::get_system_user_ticket`].
    pub async fn get_system_user_ticket_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Ticket, SystemUserError> {
        let start = Instant::now();

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(target: "sysuser.client", "Ticket acquisition cancelled by caller");
                metrics::record_exchange("cancelled", start.elapsed());
                Err(SystemUserError::Cancelled)
            }
            result = self.get_system_user_ticket() => result,
        }
    }

    /// The identity stored by the most recently completed validation.
    pub fn last_claims_identity(&self) -> Option<ClaimsIdentity> {
        self.identity.borrow().clone()
    }

    /// Observe every identity update.
    pub fn subscribe_claims_identity(&self) -> watch::Receiver<Option<ClaimsIdentity>> {
        self.identity.subscribe()
    }

    async fn acquire_ticket(&self) -> Result<Ticket, SystemUserError> {
        let sub_domain = self.descriptor.sub_domain();

        let token = match self.exchange_for_token().await? {
            TokenExchangeResult::Success { token } => token,
            TokenExchangeResult::Failure { error_message } => {
                tracing::warn!(
                    target: "sysuser.client",
                    error_message = %error_message,
                    "System user exchange rejected"
                );
                return Err(SystemUserError::RemoteRejection(error_message));
            }
        };

        let identity = match self.validate_for(token.expose_secret(), sub_domain).await? {
            ValidationOutcome::Valid(identity) => identity,
            ValidationOutcome::Invalid(failure) => {
                tracing::warn!(
                    target: "sysuser.client",
                    check = failure.check(),
                    "System user token failed validation"
                );
                return Err(SystemUserError::TokenValidation {
                    token,
                    sub_domain: sub_domain.to_string(),
                    failure,
                });
            }
        };

        let claim = identity.find(&self.config.ticket_claim).ok_or_else(|| {
            tracing::error!(
                target: "sysuser.client",
                claim = %self.config.ticket_claim,
                "Validated token has no ticket claim"
            );
            SystemUserError::ProtocolContract(format!(
                "validated token has no '{}' claim",
                self.config.ticket_claim
            ))
        })?;

        tracing::info!(target: "sysuser.client", "System user ticket acquired");
        Ok(Ticket::new(claim.value.clone()))
    }

    async fn validate_for(
        &self,
        token: &str,
        sub_domain: &str,
    ) -> Result<ValidationOutcome, SystemUserError> {
        let outcome = match self.validator.parse(token) {
            Ok(parsed) => {
                let trust = self
                    .key_resolver
                    .resolve(sub_domain)
                    .await
                    .map_err(resolution_error)?;

                match self.validator.verify(token, &parsed, &trust) {
                    ValidationOutcome::Invalid(
                        ValidationFailure::UnknownSigningKey | ValidationFailure::NoSigningKeys,
                    ) => {
                        // The tenant may have rotated keys since they were resolved.
                        tracing::debug!(
                            target: "sysuser.client",
                            kid = ?parsed.kid(),
                            "Signing key not in resolved trust, refreshing once"
                        );
                        let trust = self
                            .key_resolver
                            .force_refresh(sub_domain)
                            .await
                            .map_err(resolution_error)?;
                        self.validator.verify(token, &parsed, &trust)
                    }
                    outcome => outcome,
                }
            }
            Err(failure) => ValidationOutcome::Invalid(failure),
        };

        metrics::record_validation(outcome.result_label());
        self.identity
            .send_replace(outcome.claims_identity().cloned());

        Ok(outcome)
    }
}

fn resolution_error(err: KeyResolutionError) -> SystemUserError {
    match err {
        KeyResolutionError::TimedOut => SystemUserError::Cancelled,
        other => SystemUserError::Transport(other.to_string()),
    }
}

impl fmt::Debug for SystemUserClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemUserClient")
            .field("descriptor", &self.descriptor)
            .field("endpoint", &self.config.endpoint)
            .field("ticket_claim", &self.config.ticket_claim)
            .finish_non_exhaustive()
    }
}
