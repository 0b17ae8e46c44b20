use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{CertDepotError, Result};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";

const LINE_WIDTH: usize = 64;

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert DER-encoded data into a PEM block carrying RFC 1421 headers.
pub fn der_to_pem_with_headers(der: &[u8], label: &str, headers: &[(&str, &str)]) -> String {
    let mut out = format!("-----BEGIN {label}-----\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\n"));
    }
    if !headers.is_empty() {
        out.push('\n');
    }
    let body = STANDARD.encode(der);
    for chunk in body.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII, every chunk boundary is a char boundary
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Parse exactly one PEM block, whatever its label and headers.
pub fn parse_single_block(data: &[u8]) -> Result<pem::Pem> {
    let mut blocks = pem::parse_many(data)?;
    match blocks.len() {
        0 => Err(CertDepotError::FormatError(
            "cannot find the next PEM formatted block".to_string(),
        )),
        1 => Ok(blocks.remove(0)),
        n => Err(CertDepotError::FormatError(format!(
            "expected one PEM block, found {n}"
        ))),
    }
}

/// Returns the DER payload of a single PEM block with the expected label and no headers.
pub fn pem_to_der(data: &[u8], label: &str) -> Result<Vec<u8>> {
    let block = parse_single_block(data)?;
    if block.tag() != label || block.headers().iter().next().is_some() {
        return Err(CertDepotError::FormatError(format!(
            "unmatched type or headers: expected {label}, found {}",
            block.tag()
        )));
    }
    Ok(block.into_contents())
}
