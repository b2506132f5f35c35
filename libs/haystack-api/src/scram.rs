//! SCRAM-SHA-256 client side of the Haystack auth handshake.
//!
//! Haystack carries the SCRAM messages of RFC 5802 in `Authorization` /
//! `WWW-Authenticate` headers as base64url `data` parameters; this module
//! only builds and checks the messages themselves.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::ClientError;

type HmacSha256 = Hmac<Sha256>;

/// Hash name servers announce for this mechanism.
pub(crate) const HASH_NAME: &str = "SHA-256";

/// `c=` attribute: base64 of the `n,,` GS2 header (no channel binding).
const CHANNEL_BINDING: &str = "biws";

pub(crate) struct Scram {
    username: String,
    password: String,
    nonce: String,
}

/// Client-final message plus the signature the server must prove.
pub(crate) struct ScramFinal {
    pub message: String,
    server_signature: Vec<u8>,
}

impl Scram {
    pub fn new(username: &str, password: &str) -> Self {
        let nonce = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 18]>());
        Self::with_nonce(username, password, nonce)
    }

    fn with_nonce(username: &str, password: &str, nonce: String) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            nonce,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", escape_name(&self.username), self.nonce)
    }

    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare())
    }

    /// Answer the server-first message `r=..,s=..,i=..`.
    pub fn client_final(&self, server_first: &str) -> Result<ScramFinal, ClientError> {
        let nonce = attribute(server_first, 'r')?;
        if !nonce.starts_with(&self.nonce) {
            return Err(auth("server nonce does not extend client nonce"));
        }
        let salt = STANDARD
            .decode(attribute(server_first, 's')?)
            .map_err(|e| auth(format!("invalid salt: {e}")))?;
        let rounds: u32 = attribute(server_first, 'i')?
            .parse()
            .map_err(|_| auth("invalid iteration count"))?;
        if rounds == 0 {
            return Err(auth("invalid iteration count"));
        }

        let without_proof = format!("c={CHANNEL_BINDING},r={nonce}");
        let auth_message = format!("{},{server_first},{without_proof}", self.client_first_bare());

        let salted = salted_password(self.password.as_bytes(), &salt, rounds)?;
        let client_key = hmac(&salted, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);
        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(&client_signature)
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = hmac(&salted, b"Server Key")?;
        Ok(ScramFinal {
            message: format!("{without_proof},p={}", STANDARD.encode(proof)),
            server_signature: hmac(&server_key, auth_message.as_bytes())?,
        })
    }
}

impl ScramFinal {
    /// Check the server-final message `v=..`.
    pub fn verify(&self, server_final: &str) -> Result<(), ClientError> {
        if let Ok(err) = attribute(server_final, 'e') {
            return Err(auth(format!("server rejected proof: {err}")));
        }
        let signature = STANDARD
            .decode(attribute(server_final, 'v')?)
            .map_err(|e| auth(format!("invalid server signature: {e}")))?;
        if signature != self.server_signature {
            return Err(auth("server signature mismatch"));
        }
        Ok(())
    }
}

/// `Hi()` of RFC 5802: PBKDF2 with HMAC-SHA-256 and one output block.
fn salted_password(password: &[u8], salt: &[u8], rounds: u32) -> Result<Vec<u8>, ClientError> {
    let mut block = salt.to_vec();
    block.extend_from_slice(&1u32.to_be_bytes());
    let mut u = hmac(password, &block)?;
    let mut out = u.clone();
    for _ in 1..rounds {
        u = hmac(password, &u)?;
        out.iter_mut().zip(&u).for_each(|(o, x)| *o ^= x);
    }
    Ok(out)
}

fn hmac(key: &[u8], message: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| auth(format!("hmac key: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn attribute(message: &str, name: char) -> Result<&str, ClientError> {
    message
        .split(',')
        .find_map(|part| part.strip_prefix(name)?.strip_prefix('='))
        .ok_or_else(|| auth(format!("missing '{name}' in SCRAM message")))
}

fn escape_name(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn auth(message: impl Into<String>) -> ClientError {
    ClientError::Auth(message.into())
}

/// Decode a header `data` parameter; padding is tolerated.
pub(crate) fn decode_data(data: &str) -> Result<String, ClientError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim().trim_end_matches('='))
        .map_err(|e| auth(format!("invalid data parameter: {e}")))?;
    String::from_utf8(bytes).map_err(|e| auth(format!("invalid data parameter: {e}")))
}

pub(crate) fn encode_data(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message)
}
