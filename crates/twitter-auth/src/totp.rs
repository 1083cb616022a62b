//! Time-based one-time passwords (RFC 6238)
//!
//! HMAC-SHA1, 30-second step, 6 digits: the parameters authenticator apps
//! use. Secrets are base32 as shown in provider enrollment screens.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

const STEP_SECS: u64 = 30;
const DIGITS: u32 = 6;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Code for the current wall-clock time.
pub fn generate_now(secret: &str) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Protocol(format!("system clock before unix epoch: {e}")))?;
    generate(secret, now.as_secs())
}

/// Code for the step containing `unix_secs`.
pub fn generate(secret: &str, unix_secs: u64) -> Result<String> {
    let key = decode_base32(secret)?;
    let counter = unix_secs / STEP_SECS;

    let mut mac = HmacSha1::new_from_slice(&key)
        .map_err(|e| Error::Protocol(format!("invalid TOTP key: {e}")))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);
    let code = binary % 10u32.pow(DIGITS);
    Ok(format!("{code:0width$}", width = DIGITS as usize))
}

/// Decode an RFC 4648 base32 secret.
///
/// Case, spaces and `=` padding are ignored.
fn decode_base32(secret: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(secret.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for ch in secret.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = ch.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET
            .iter()
            .position(|&b| b == upper)
            .ok_or_else(|| Error::Protocol(format!("invalid base32 character {ch:?} in TOTP secret")))?;
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    if out.is_empty() {
        return Err(Error::Protocol("empty TOTP secret".into()));
    }
    Ok(out)
}
