//! Deposit webhook surface
//!
//! The chain watcher posts `{txHash, userKey, amount, confirmations}` and,
//! when a verifying key is configured, signs `timestamp || body` with
//! Ed25519. Unsigned or badly signed payloads never reach the reconciler.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use crate::deposits::{DepositConfirmation, DepositOutcome, DepositReconciler};
use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing signature or timestamp")]
    MissingSignature,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature rejected: {0}")]
    InvalidSignature(String),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn decode_array<const N: usize>(value: &str, what: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(value.trim()).map_err(|e| format!("invalid {what} hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| format!("{what} must be {N} bytes"))
}

fn signed_message(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    message
}

/// Checks webhook signatures against the watcher's public key
#[derive(Clone)]
pub struct WebhookVerifier {
    key: VerifyingKey,
}

impl WebhookVerifier {
    pub fn from_hex(public_key_hex: &str) -> Result<Self, WebhookError> {
        let bytes = decode_array::<32>(public_key_hex, "public key").map_err(WebhookError::InvalidKey)?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| WebhookError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> Result<(), WebhookError> {
        let bytes =
            decode_array::<64>(signature_hex, "signature").map_err(WebhookError::InvalidSignature)?;
        let signature = Signature::from_bytes(&bytes);
        self.key
            .verify(&signed_message(timestamp, body), &signature)
            .map_err(|e| WebhookError::InvalidSignature(e.to_string()))
    }
}

/// Sender side of the scheme, used by tooling and tests
pub struct WebhookSigner {
    signing_key: SigningKey,
}

impl WebhookSigner {
    /// Create from a 32-byte hex seed
    pub fn from_hex(seed_hex: &str) -> Result<Self, WebhookError> {
        let seed = decode_array::<32>(seed_hex, "seed").map_err(WebhookError::InvalidKey)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    pub fn seed_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        hex::encode(self.signing_key.sign(&signed_message(timestamp, body)).to_bytes())
    }
}

/// An inbound delivery: raw body plus signature headers
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    pub body: &'a [u8],
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Verifies, parses and reconciles deposit webhooks
#[derive(Clone)]
pub struct DepositWebhook {
    verifier: Option<WebhookVerifier>,
    reconciler: DepositReconciler,
}

impl DepositWebhook {
    pub fn new(reconciler: DepositReconciler, verifier: Option<WebhookVerifier>) -> Self {
        if verifier.is_none() {
            tracing::warn!("Deposit webhook accepts unsigned payloads");
        }
        Self {
            verifier,
            reconciler,
        }
    }

    pub fn parse(body: &[u8]) -> Result<DepositConfirmation, WebhookError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub async fn handle(&self, request: WebhookRequest<'_>) -> Result<DepositOutcome, WebhookError> {
        if let Some(verifier) = &self.verifier {
            let (Some(timestamp), Some(signature)) = (request.timestamp, request.signature) else {
                return Err(WebhookError::MissingSignature);
            };
            verifier.verify(timestamp, request.body, signature)?;
        }

        let confirmation = Self::parse(request.body)?;
        Ok(self.reconciler.on_deposit_confirmed(&confirmation).await?)
    }
}
