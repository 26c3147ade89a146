use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::constants::SALT_LEN;

type HmacSha256 = Hmac<Sha256>;

/// Fresh random salt for a new credential, hex encoded
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

fn keyed_mac(name: &str, password: &str, salt: &str, pepper: &str) -> Option<HmacSha256> {
    let mut mac = match HmacSha256::new_from_slice(pepper.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            tracing::error!("Failed to create HMAC instance");
            return None;
        }
    };

    // Length-prefix the name so ("ab", "c") and ("a", "bc") differ
    mac.update(&(name.len() as u64).to_be_bytes());
    mac.update(name.as_bytes());
    mac.update(password.as_bytes());
    mac.update(salt.as_bytes());
    Some(mac)
}

/// Digest stored for a credential
///
/// `HMAC-SHA256(pepper, len(name) || name || password || salt)`, hex encoded.
/// The pepper lives in the environment, never in the store.
pub fn credential_digest(name: &str, password: &str, salt: &str, pepper: &str) -> String {
    match keyed_mac(name, password, salt, pepper) {
        Some(mac) => hex::encode(mac.finalize().into_bytes()),
        None => String::new(),
    }
}

/// Check a login attempt against a stored digest in constant time
pub fn verify_credential(
    name: &str,
    password: &str,
    salt: &str,
    pepper: &str,
    digest: &str,
) -> bool {
    let Some(mac) = keyed_mac(name, password, salt, pepper) else {
        return false;
    };

    let expected = match hex::decode(digest) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!("Stored credential digest is not valid hex");
            return false;
        }
    };

    mac.verify_slice(&expected).is_ok()
}
