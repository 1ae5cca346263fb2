use base64::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD, decode_config, encode_config};
use jwt_simple::prelude::ES256KeyPair;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

/// Fresh key material printed by `agenda init`.
#[derive(Debug, Clone)]
pub struct GeneratedKeys {
    pub vapid_private_key: String,
    pub vapid_public_key: String,
    pub signing_key: String,
}

pub fn generate_keys() -> Result<GeneratedKeys, web_push::WebPushError> {
    let mut rng = OsRng;
    generate_keys_with_rng(&mut rng)
}

pub(crate) fn generate_keys_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<GeneratedKeys, web_push::WebPushError> {
    let vapid = generate_es256_keypair_with_rng(rng);
    let vapid_private_key = encode_key(&vapid.to_bytes());
    let vapid_public_key =
        web_push::VapidSignatureBuilder::from_base64_no_sub(&vapid_private_key, URL_SAFE_NO_PAD)?
            .get_public_key();
    let signing = generate_es256_keypair_with_rng(rng);

    Ok(GeneratedKeys {
        vapid_private_key,
        vapid_public_key: encode_key(&vapid_public_key),
        signing_key: encode_key(&signing.to_bytes()),
    })
}

pub(crate) fn generate_es256_keypair_with_rng<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> ES256KeyPair {
    let mut key_bytes = [0u8; 32];
    loop {
        rng.fill_bytes(&mut key_bytes);
        if let Ok(key_pair) = ES256KeyPair::from_bytes(&key_bytes) {
            return key_pair;
        }
    }
}

pub(crate) fn encode_key(bytes: &[u8]) -> String {
    encode_config(bytes, URL_SAFE_NO_PAD)
}

/// Accepts url-safe or standard base64, padded or not.
pub(crate) fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    decode_config(trimmed, URL_SAFE_NO_PAD)
        .or_else(|_| decode_config(trimmed, STANDARD))
        .or_else(|_| decode_config(trimmed, STANDARD_NO_PAD))
        .ok()
        .filter(|decoded| !decoded.is_empty())
}
