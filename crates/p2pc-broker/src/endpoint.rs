//! Miner callback URL encoding.
//!
//! The program stores each miner's URL in a 32-byte field, right-padded with
//! zero bytes. NUL never appears in a valid URL, so rejecting it on encode
//! makes stripping trailing zeros on decode lossless.

use crate::error::{BrokerError, Result};

/// Width of the stored URL field in bytes.
pub const URL_FIELD_LEN: usize = 32;

const PADDING: u8 = 0;

/// Validate a callback URL and encode it into the fixed-width field.
///
/// # Errors
///
/// Returns an encoding error if the URL is not absolute, contains a NUL
/// byte, or is longer than [`URL_FIELD_LEN`] bytes.
pub fn encode_url(url: &str) -> Result<[u8; URL_FIELD_LEN]> {
    let bytes = url.as_bytes();
    if bytes.len() > URL_FIELD_LEN {
        return Err(BrokerError::encoding(format!(
            "url '{url}' is {} bytes, field holds {URL_FIELD_LEN}",
            bytes.len()
        )));
    }
    if bytes.contains(&PADDING) {
        return Err(BrokerError::encoding("url must not contain NUL bytes"));
    }
    url::Url::parse(url).map_err(|e| BrokerError::encoding(format!("invalid url '{url}': {e}")))?;

    let mut field = [PADDING; URL_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Decode a stored URL field. An all-zero field decodes to an empty string.
///
/// # Errors
///
/// Returns an encoding error if the content is not UTF-8 or padding is
/// followed by further data.
pub fn decode_url(field: &[u8; URL_FIELD_LEN]) -> Result<String> {
    let len = field
        .iter()
        .rposition(|&b| b != PADDING)
        .map_or(0, |last| last + 1);
    let content = &field[..len];
    if content.contains(&PADDING) {
        return Err(BrokerError::encoding("url field has data after padding"));
    }
    String::from_utf8(content.to_vec())
        .map_err(|e| BrokerError::encoding(format!("url field is not UTF-8: {e}")))
}
