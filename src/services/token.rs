use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes behind every magic-link token.
pub const MAGIC_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token length must be greater than zero")]
    EmptyLength,
    #[error("Entropy source failed: {0}")]
    Entropy(#[from] rand::Error),
}

/// Random bytes from the OS generator, base64url-encoded without padding so the
/// result can be dropped into a query string as is.
pub fn generate_token(byte_len: usize) -> Result<String, TokenError> {
    if byte_len == 0 {
        return Err(TokenError::EmptyLength);
    }

    let mut bytes = vec![0u8; byte_len];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
