//! Chapa payment provider client.
//!
//! Wraps Chapa's transaction initialize/verify API. All transport and
//! response-shape concerns stop here: callers receive normalized outcomes
//! and never see HTTP status codes or reqwest errors. A provider-side
//! rejection and a network failure both collapse to [`GatewayError`], with
//! the distinction kept in `kind` for the logs.

use anyhow::Result;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ChapaConfig;

/// Per-call timeout for every provider request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ChapaClient {
    client: Client,
    config: ChapaConfig,
}

/// Parameters for initiating a hosted checkout with Chapa.
#[derive(Debug)]
pub struct InitializeParams<'a> {
    /// Our payment reference, sent to Chapa as `tx_ref`.
    pub reference: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub return_url: &'a str,
    pub callback_url: Option<&'a str>,
    pub description: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    /// Stringified decimal; Chapa rejects float drift.
    amount: String,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    tx_ref: &'a str,
    return_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a serde_json::Value>,
}

/// Chapa's standard response envelope.
#[derive(Debug, Deserialize)]
struct ChapaEnvelope {
    status: Option<String>,
    message: Option<String>,
    data: Option<serde_json::Value>,
}

/// Outcome of an initialize call, normalized for the coordinator.
#[derive(Debug)]
pub enum InitializeOutcome {
    Success {
        checkout_url: String,
        raw: serde_json::Value,
    },
    Error(GatewayError),
}

/// Outcome of a verify call, normalized for the coordinator.
#[derive(Debug)]
pub enum VerifyOutcome {
    Success {
        provider_status: ProviderStatus,
        transaction_id: Option<String>,
        provider_reference: Option<String>,
        raw: serde_json::Value,
    },
    Error(GatewayError),
}

#[derive(Debug)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// Provider response body, when one was received.
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The provider was never reached, or the call timed out.
    Transport,
    /// The provider replied, but with an error.
    Provider,
}

/// Chapa's transaction status vocabulary, translated at this boundary so
/// the coordinator never branches on raw provider strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Success,
    Failed,
    Pending,
    Unknown,
}

impl ProviderStatus {
    fn from_provider(status: &str) -> Self {
        match status {
            "success" => ProviderStatus::Success,
            "failed" => ProviderStatus::Failed,
            "pending" => ProviderStatus::Pending,
            _ => ProviderStatus::Unknown,
        }
    }
}

impl ChapaClient {
    pub fn new(config: ChapaConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// Whether a Chapa secret key is present.
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Initialize a hosted checkout session.
    ///
    /// Never fails to the caller; every failure mode is folded into
    /// [`InitializeOutcome::Error`].
    pub async fn initialize(&self, params: InitializeParams<'_>) -> InitializeOutcome {
        let request = InitializeRequest {
            amount: params.amount.to_string(),
            currency: params.currency,
            email: params.email,
            first_name: params.first_name,
            last_name: params.last_name,
            tx_ref: params.reference,
            return_url: params.return_url,
            callback_url: params.callback_url,
            description: &params.description,
            meta: params.metadata.as_ref(),
        };

        let url = format!("{}/transaction/initialize", self.config.api_base_url);

        let response = match self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(tx_ref = %params.reference, error = %e, "Network error during payment initiation");
                return InitializeOutcome::Error(GatewayError {
                    kind: GatewayErrorKind::Transport,
                    message: "Network error occurred. Please try again.".to_string(),
                    raw: None,
                });
            }
        };

        let http_status = response.status();
        let (envelope, raw) = match self.read_envelope(response).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(tx_ref = %params.reference, error = %e, "Malformed response from Chapa initialize");
                return InitializeOutcome::Error(GatewayError {
                    kind: GatewayErrorKind::Transport,
                    message: "Network error occurred. Please try again.".to_string(),
                    raw: None,
                });
            }
        };

        tracing::debug!(tx_ref = %params.reference, status = %http_status, "Chapa initialize response");

        if http_status.is_success() && envelope.status.as_deref() == Some("success") {
            let checkout_url = envelope
                .data
                .as_ref()
                .and_then(|d| d.get("checkout_url"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            match checkout_url {
                Some(checkout_url) => {
                    tracing::info!(tx_ref = %params.reference, "Chapa checkout session created");
                    InitializeOutcome::Success { checkout_url, raw }
                }
                None => {
                    tracing::error!(tx_ref = %params.reference, "Chapa initialize succeeded without a checkout_url");
                    InitializeOutcome::Error(GatewayError {
                        kind: GatewayErrorKind::Provider,
                        message: "Payment initiation failed".to_string(),
                        raw: Some(raw),
                    })
                }
            }
        } else {
            let message = envelope
                .message
                .unwrap_or_else(|| "Payment initiation failed".to_string());
            tracing::error!(tx_ref = %params.reference, status = %http_status, message = %message, "Chapa rejected payment initiation");
            InitializeOutcome::Error(GatewayError {
                kind: GatewayErrorKind::Provider,
                message,
                raw: Some(raw),
            })
        }
    }

    /// Verify the transaction identified by our payment reference.
    pub async fn verify(&self, reference: &str) -> VerifyOutcome {
        let url = format!("{}/transaction/verify/{}", self.config.api_base_url, reference);

        let response = match self
            .client
            .get(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(tx_ref = %reference, error = %e, "Network error during payment verification");
                return VerifyOutcome::Error(GatewayError {
                    kind: GatewayErrorKind::Transport,
                    message: "Network error occurred. Please try again.".to_string(),
                    raw: None,
                });
            }
        };

        let http_status = response.status();
        let (envelope, raw) = match self.read_envelope(response).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(tx_ref = %reference, error = %e, "Malformed response from Chapa verify");
                return VerifyOutcome::Error(GatewayError {
                    kind: GatewayErrorKind::Transport,
                    message: "Network error occurred. Please try again.".to_string(),
                    raw: None,
                });
            }
        };

        tracing::debug!(tx_ref = %reference, status = %http_status, "Chapa verify response");

        if http_status.is_success() && envelope.status.as_deref() == Some("success") {
            let data = envelope.data.unwrap_or(serde_json::Value::Null);
            let provider_status = data
                .get("status")
                .and_then(|v| v.as_str())
                .map(ProviderStatus::from_provider)
                .unwrap_or(ProviderStatus::Unknown);
            let transaction_id = data
                .get("reference")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let provider_reference = data
                .get("tx_ref")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            tracing::info!(
                tx_ref = %reference,
                provider_status = ?provider_status,
                "Chapa verification completed"
            );

            VerifyOutcome::Success {
                provider_status,
                transaction_id,
                provider_reference,
                raw,
            }
        } else {
            let message = envelope
                .message
                .unwrap_or_else(|| "Payment verification failed".to_string());
            tracing::error!(tx_ref = %reference, status = %http_status, message = %message, "Chapa rejected payment verification");
            VerifyOutcome::Error(GatewayError {
                kind: GatewayErrorKind::Provider,
                message,
                raw: Some(raw),
            })
        }
    }

    /// Read a response body as the Chapa envelope plus the raw JSON value
    /// kept for audit.
    async fn read_envelope(
        &self,
        response: reqwest::Response,
    ) -> Result<(ChapaEnvelope, serde_json::Value)> {
        let body = response.text().await?;
        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let envelope: ChapaEnvelope = serde_json::from_value(raw.clone())?;
        Ok((envelope, raw))
    }
}
