use crate::keys;
use crate::types::appointment::AppointmentSnapshot;

use jwt_simple::prelude::{
    Claims, Duration as JwtDuration, ECDSAP256KeyPairLike, ECDSAP256PublicKeyLike, ES256KeyPair,
    ES256PublicKey, VerificationOptions,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::collections::HashSet;
use std::sync::Arc;

/// Issuer claim on every signature the server produces.
pub const SIGNATURE_ISSUER: &str = "agenda";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("failed to sign payload")]
    Sign,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct PayloadClaims {
    digest: String,
}

/// Signs what the server pushes so clients can tell it came from here.
/// The token is an ES256 JWT carrying the SHA-256 digest of the payload.
#[derive(Clone)]
pub struct NotificationSigner {
    key_pair: Arc<ES256KeyPair>,
    issuer: String,
    ttl: time::Duration,
}

impl std::fmt::Debug for NotificationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSigner")
            .field("public_key", &self.public_key())
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl NotificationSigner {
    pub fn from_key(raw: &str, issuer: &str, ttl: time::Duration) -> Result<Self, SigningError> {
        let bytes = keys::decode_key(raw).ok_or(SigningError::InvalidKey)?;
        let key_pair = ES256KeyPair::from_bytes(&bytes).map_err(|_| SigningError::InvalidKey)?;
        Ok(Self::from_key_pair(key_pair, issuer, ttl))
    }

    /// Throwaway key; clients must re-register after a restart.
    pub fn ephemeral(issuer: &str, ttl: time::Duration) -> Self {
        let mut rng = OsRng;
        let key_pair = keys::generate_es256_keypair_with_rng(&mut rng);
        Self::from_key_pair(key_pair, issuer, ttl)
    }

    pub(crate) fn from_key_pair(key_pair: ES256KeyPair, issuer: &str, ttl: time::Duration) -> Self {
        Self {
            key_pair: Arc::new(key_pair),
            issuer: issuer.to_string(),
            ttl,
        }
    }

    /// The credential handed to registering clients.
    pub fn public_key(&self) -> String {
        keys::encode_key(&self.key_pair.public_key().to_bytes())
    }

    pub fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier {
            public_key: Arc::new(self.key_pair.public_key()),
            issuer: self.issuer.clone(),
        }
    }

    pub fn sign(&self, payload: &[u8]) -> Result<String, SigningError> {
        let ttl_seconds = self.ttl.whole_seconds();
        if ttl_seconds <= 0 {
            return Err(SigningError::Sign);
        }
        let claims = Claims::with_custom_claims(
            PayloadClaims {
                digest: digest(payload),
            },
            JwtDuration::from_secs(ttl_seconds as u64),
        )
        .with_issuer(&self.issuer);
        self.key_pair.sign(claims).map_err(|_| SigningError::Sign)
    }

    pub fn sign_snapshot(&self, snapshot: &AppointmentSnapshot) -> Result<String, SigningError> {
        self.sign(&snapshot_payload(snapshot)?)
    }
}

/// Client-side counterpart of [`NotificationSigner`], built from the
/// credential returned at registration.
#[derive(Clone)]
pub struct SignatureVerifier {
    public_key: Arc<ES256PublicKey>,
    issuer: String,
}

impl SignatureVerifier {
    pub fn from_credential(credential: &str, issuer: &str) -> Result<Self, SigningError> {
        let bytes = keys::decode_key(credential).ok_or(SigningError::InvalidKey)?;
        let public_key =
            ES256PublicKey::from_bytes(&bytes).map_err(|_| SigningError::InvalidKey)?;
        Ok(Self {
            public_key: Arc::new(public_key),
            issuer: issuer.to_string(),
        })
    }

    pub fn verify(&self, signature: &str, payload: &[u8]) -> Result<(), SigningError> {
        let mut options = VerificationOptions::default();
        let mut issuers = HashSet::new();
        issuers.insert(self.issuer.clone());
        options.allowed_issuers = Some(issuers);

        let claims = self
            .public_key
            .verify_token::<PayloadClaims>(signature, Some(options))
            .map_err(|_| SigningError::InvalidSignature)?;
        if claims.custom.digest != digest(payload) {
            return Err(SigningError::InvalidSignature);
        }
        Ok(())
    }

    pub fn verify_snapshot(
        &self,
        signature: &str,
        snapshot: &AppointmentSnapshot,
    ) -> Result<(), SigningError> {
        self.verify(signature, &snapshot_payload(snapshot)?)
    }
}

/// Bytes covered by a signature over `snapshot`.
pub fn snapshot_payload(snapshot: &AppointmentSnapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(snapshot)
}

fn digest(payload: &[u8]) -> String {
    keys::encode_key(&Sha256::digest(payload))
}
