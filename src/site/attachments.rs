//! Decoding of `data:` URI attachments.
//!
//! Attachments arrive as `data:[<mime>][;charset=..][;base64],<payload>`.
//! Base64 payloads are decoded strictly; anything else is taken verbatim.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{Attachment, FileSet};

/// Errors decoding an attachment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Not a data URI: {0}")]
    NotDataUri(String),

    #[error("Data URI is missing the ',' separator")]
    MissingSeparator,

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Unsafe attachment name: {0}")]
    UnsafeName(String),
}

/// Decode a `data:` URI into raw bytes
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, DecodeError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DecodeError::NotDataUri(truncate(uri)))?;

    let (header, payload) = rest.split_once(',').ok_or(DecodeError::MissingSeparator)?;

    let is_base64 = header
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));

    if is_base64 {
        // Tolerate line-wrapped payloads
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Decode one wire attachment, naming it from the URI hash if unnamed
pub fn decode_attachment(name: Option<&str>, uri: &str) -> Result<Attachment, DecodeError> {
    let bytes = decode_data_uri(uri)?;

    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => validate_name(n)?.to_string(),
        None => {
            let digest = Sha256::digest(uri.as_bytes());
            format!("attachment-{}", &hex::encode(digest)[..6])
        }
    };

    Ok(Attachment::new(name, bytes))
}

/// Reject names that would escape the repository root or touch git metadata
fn validate_name(name: &str) -> Result<&str, DecodeError> {
    let unsafe_name = name.starts_with('/')
        || name.contains('\\')
        || name
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == ".." || part == ".git");

    if unsafe_name {
        return Err(DecodeError::UnsafeName(name.to_string()));
    }
    Ok(name)
}

/// Convert decoded attachments into publishable files
pub fn attachment_files(attachments: &[Attachment]) -> FileSet {
    let mut files = FileSet::new();
    for attachment in attachments {
        files.insert(attachment.name.clone(), attachment.bytes.clone());
    }
    files
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}
