// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `SigningKeyStore`: Ed25519 bootstrap-token issuance and JWKS publication.
//!
//! Grounded on the compact-serialization approach any JWT issuer needs
//! (header.payload.signature, base64url, no padding) and on the wire's
//! decimal-string convention for 64-bit values (`wire::CreateBootstrapTokenResponse`).

use crate::error::RpcError;
use crate::time::now_ms;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Bootstrap tokens are short-lived; the holder is expected to redeem one
/// for a durable credential within this window.
pub const BOOTSTRAP_TOKEN_TTL_SECONDS: i64 = 300;

const ISSUER: &str = "coral-discovery";
const AUDIENCE: &str = "coral-colony";

/// A single Ed25519 signing key as carried in `DISCOVERY_SIGNING_KEY`.
#[derive(Debug, Deserialize)]
struct RawSigningKey {
    id: String,
    #[serde(rename = "privateKey")]
    private_key: String,
}

/// A single Ed25519 public key as carried in `DISCOVERY_PREVIOUS_KEYS`,
/// retained only so its JWKS entry keeps validating tokens minted before
/// a rotation.
#[derive(Debug, Deserialize)]
struct RawPublicKey {
    id: String,
    #[serde(rename = "publicKey")]
    public_key: String,
}

struct NamedVerifyingKey {
    id: String,
    key: VerifyingKey,
}

/// The current signing key: a signing capability plus the public key the
/// operator explicitly supplied alongside it (never one re-derived from the
/// seed; see `import_current_key`).
struct CurrentKey {
    id: String,
    signer: SigningKey,
    verifying: VerifyingKey,
}

/// Holds the active signing key plus any retired public keys still published
/// in JWKS during a rotation window.
pub struct SigningKeyStore {
    current: CurrentKey,
    previous: Vec<NamedVerifyingKey>,
}

impl SigningKeyStore {
    /// Parses `DISCOVERY_SIGNING_KEY` (required) and `DISCOVERY_PREVIOUS_KEYS`
    /// (optional) from their JSON wire forms.
    pub fn from_config(
        signing_key_json: &str,
        previous_keys_json: Option<&str>,
    ) -> Result<Self, RpcError> {
        let raw: RawSigningKey = serde_json::from_str(signing_key_json)
            .map_err(|e| RpcError::internal(format!("invalid signing key config: {e}")))?;
        let current = import_current_key(&raw.id, &raw.private_key)?;

        let previous = match previous_keys_json {
            Some(json) => {
                let raw: Vec<RawPublicKey> = serde_json::from_str(json)
                    .map_err(|e| RpcError::internal(format!("invalid previous keys config: {e}")))?;
                raw.into_iter()
                    .map(|r| {
                        import_verifying_key(&r.public_key)
                            .map(|key| NamedVerifyingKey { id: r.id, key })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        Ok(Self { current, previous })
    }

    /// Mint a bootstrap token. Any of `reef_id`/`colony_id`/`agent_id`/`intent`
    /// may be absent; absent claims are simply omitted from the payload.
    pub fn create_bootstrap_token(
        &self,
        reef_id: Option<&str>,
        colony_id: Option<&str>,
        agent_id: Option<&str>,
        intent: Option<&str>,
    ) -> Result<(String, i64), RpcError> {
        let iat = now_ms() / 1000;
        let exp = iat + BOOTSTRAP_TOKEN_TTL_SECONDS;

        let header = JwtHeader {
            alg: "EdDSA",
            typ: "JWT",
            kid: self.current.id.clone(),
        };
        let claims = JwtClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            iss: ISSUER.to_string(),
            aud: vec![AUDIENCE.to_string()],
            iat,
            exp,
            reef_id: reef_id.map(str::to_string),
            colony_id: colony_id.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            intent: intent.map(str::to_string),
        };

        let header_b64 = encode_segment(&header)?;
        let claims_b64 = encode_segment(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature = self.current.signer.sign(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        let jwt = format!("{signing_input}.{signature_b64}");
        Ok((jwt, exp))
    }

    /// All keys (current plus retired) in JWKS form.
    pub fn jwks(&self) -> JwksDocument {
        let mut keys = vec![jwk_entry(&self.current.id, &self.current.verifying)];
        for retired in &self.previous {
            keys.push(jwk_entry(&retired.id, &retired.key));
        }
        JwksDocument { keys }
    }
}

/// Imports the current signing key. The base64 payload must decode to
/// exactly 64 bytes: a 32-byte seed followed by its 32-byte public key. A
/// bare 32-byte seed is rejected: the wire format carries no independently
/// supplied public key to cross-check a derived one against, so the operator
/// must supply both halves explicitly rather than have one inferred.
fn import_current_key(id: &str, private_key_b64: &str) -> Result<CurrentKey, RpcError> {
    let bytes = STANDARD.decode(private_key_b64).map_err(|e| {
        RpcError::internal(format!("invalid privateKey base64: {e}"))
    })?;
    if bytes.len() != 64 {
        return Err(RpcError::internal(
            "privateKey must be the 64-byte seed\u{2016}public-key form; a 32-byte seed alone is rejected",
        ));
    }
    let seed: [u8; 32] = bytes[..32].try_into().unwrap();
    let public: [u8; 32] = bytes[32..].try_into().unwrap();

    let signer = SigningKey::from_bytes(&seed);
    let verifying = VerifyingKey::from_bytes(&public)
        .map_err(|e| RpcError::internal(format!("invalid embedded public key: {e}")))?;

    Ok(CurrentKey {
        id: id.to_string(),
        signer,
        verifying,
    })
}

fn import_verifying_key(public_key_b64: &str) -> Result<VerifyingKey, RpcError> {
    let bytes = STANDARD
        .decode(public_key_b64)
        .map_err(|e| RpcError::internal(format!("invalid publicKey base64: {e}")))?;
    let raw: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RpcError::internal("publicKey must be exactly 32 bytes"))?;
    VerifyingKey::from_bytes(&raw).map_err(|e| RpcError::internal(format!("invalid publicKey: {e}")))
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, RpcError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| RpcError::internal(format!("encoding JWT segment: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn jwk_entry(id: &str, key: &VerifyingKey) -> Jwk {
    Jwk {
        kty: "OKP",
        crv: "Ed25519",
        kid: id.to_string(),
        x: URL_SAFE_NO_PAD.encode(key.to_bytes()),
        key_use: "sig",
        alg: "EdDSA",
    }
}

#[derive(Debug, Serialize)]
struct JwtHeader {
    alg: &'static str,
    typ: &'static str,
    kid: String,
}

/// Claim keys are snake_case, matching the custom-claims convention the
/// token format uses, distinct from the camelCase RPC wire.
#[derive(Debug, Serialize)]
struct JwtClaims {
    jti: String,
    iss: String,
    aud: Vec<String>,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reef_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    colony_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    pub crv: &'static str,
    pub kid: String,
    pub x: String,
    #[serde(rename = "use")]
    pub key_use: &'static str,
    pub alg: &'static str,
}

#[derive(Debug, Serialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey as DalekSigningKey;
    use rand_core::OsRng;

    fn test_signing_key_json() -> (String, DalekSigningKey) {
        let key = DalekSigningKey::generate(&mut OsRng);
        let mut combined = Vec::with_capacity(64);
        combined.extend_from_slice(&key.to_bytes());
        combined.extend_from_slice(key.verifying_key().as_bytes());
        let json = serde_json::json!({
            "id": "k1",
            "privateKey": STANDARD.encode(combined),
        })
        .to_string();
        (json, key)
    }

    #[test]
    fn test_rejects_bare_32_byte_seed() {
        let json = serde_json::json!({
            "id": "k1",
            "privateKey": STANDARD.encode([0u8; 32]),
        })
        .to_string();
        assert!(SigningKeyStore::from_config(&json, None).is_err());
    }

    #[test]
    fn test_rejects_wrong_length_key() {
        let json = serde_json::json!({
            "id": "k1",
            "privateKey": STANDARD.encode([0u8; 48]),
        })
        .to_string();
        assert!(SigningKeyStore::from_config(&json, None).is_err());
    }

    #[test]
    fn test_accepts_64_byte_seed_and_public_key() {
        let (json, _) = test_signing_key_json();
        assert!(SigningKeyStore::from_config(&json, None).is_ok());
    }

    #[test]
    fn test_create_bootstrap_token_has_three_segments() {
        let (json, _) = test_signing_key_json();
        let store = SigningKeyStore::from_config(&json, None).unwrap();
        let (jwt, exp) = store
            .create_bootstrap_token(Some("reef1"), Some("colony1"), None, Some("join"))
            .unwrap();
        assert_eq!(jwt.split('.').count(), 3);
        assert!(exp > now_ms() / 1000);
    }

    #[test]
    fn test_signature_verifies_against_current_key() {
        let (json, key) = test_signing_key_json();
        let store = SigningKeyStore::from_config(&json, None).unwrap();
        let (jwt, _) = store.create_bootstrap_token(None, None, None, None).unwrap();

        let mut parts = jwt.splitn(3, '.');
        let header = parts.next().unwrap();
        let payload = parts.next().unwrap();
        let signature_b64 = parts.next().unwrap();

        let signing_input = format!("{header}.{payload}");
        let sig_bytes = URL_SAFE_NO_PAD.decode(signature_b64).unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&sig_bytes).unwrap();

        use ed25519_dalek::Verifier;
        assert!(key
            .verifying_key()
            .verify(signing_input.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_jwt_verifies_against_published_jwks_key() {
        let (json, _) = test_signing_key_json();
        let store = SigningKeyStore::from_config(&json, None).unwrap();
        let (jwt, _) = store.create_bootstrap_token(None, None, None, None).unwrap();

        let mut parts = jwt.splitn(3, '.');
        let header_b64 = parts.next().unwrap();
        let payload_b64 = parts.next().unwrap();
        let signature_b64 = parts.next().unwrap();

        let header_json = URL_SAFE_NO_PAD.decode(header_b64).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header_json).unwrap();
        let kid = header["kid"].as_str().unwrap();

        let jwks = store.jwks();
        let jwk = jwks.keys.iter().find(|k| k.kid == kid).unwrap();
        let public_bytes = URL_SAFE_NO_PAD.decode(&jwk.x).unwrap();
        let verifying = VerifyingKey::from_bytes(&public_bytes.try_into().unwrap()).unwrap();

        let signing_input = format!("{header_b64}.{payload_b64}");
        let sig_bytes = URL_SAFE_NO_PAD.decode(signature_b64).unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&sig_bytes).unwrap();

        use ed25519_dalek::Verifier;
        assert!(verifying.verify(signing_input.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn test_jwks_includes_current_and_previous_keys() {
        let (current_json, _) = test_signing_key_json();
        let previous_key = DalekSigningKey::generate(&mut OsRng);
        let previous_json = serde_json::json!([{
            "id": "k0",
            "publicKey": STANDARD.encode(previous_key.verifying_key().to_bytes()),
        }])
        .to_string();

        let store = SigningKeyStore::from_config(&current_json, Some(&previous_json)).unwrap();
        let jwks = store.jwks();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[1].kid, "k0");
        assert_eq!(jwks.keys[0].kty, "OKP");
    }
}
