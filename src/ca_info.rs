//! Serial number bookkeeping for the certificate authority.

use rsa::BigUint;

use crate::error::{CertDepotError, Result};

/// Serial number given to the CA certificate itself.
pub const AUTHORITY_SERIAL_NUMBER: u32 = 1;
/// First serial number handed out to hosts.
pub const START_SERIAL_NUMBER: u32 = 2;

/// The CA's next serial number.
///
/// Persisted as a bare JSON number. Not synchronised: two holders of copies
/// loaded from the same stored state hand out the same serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAuthorityInfo {
    serial_number: BigUint,
}

impl Default for CertificateAuthorityInfo {
    fn default() -> Self {
        Self::new(BigUint::from(START_SERIAL_NUMBER))
    }
}

impl CertificateAuthorityInfo {
    pub fn new(start_serial: BigUint) -> Self {
        Self {
            serial_number: start_serial,
        }
    }

    /// Reads a bare JSON number; integers of any size are kept exactly.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let number: serde_json::Number = serde_json::from_slice(data)
            .map_err(|e| CertDepotError::ParseError(format!("serial number info: {e}")))?;
        let text = number.to_string();
        let serial_number = text
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| BigUint::parse_bytes(text.as_bytes(), 10))
            .flatten()
            .ok_or_else(|| {
                CertDepotError::ParseError(format!(
                    "serial number info is not a non-negative integer: {text}"
                ))
            })?;
        Ok(Self { serial_number })
    }

    /// Canonical decimal digits.
    pub fn to_json(&self) -> Vec<u8> {
        self.serial_number.to_str_radix(10).into_bytes()
    }

    /// The serial the next issued certificate will get.
    pub fn serial_number(&self) -> &BigUint {
        &self.serial_number
    }

    /// Hands out the current serial and advances the counter by one.
    pub fn next_serial(&mut self) -> BigUint {
        let serial = self.serial_number.clone();
        self.serial_number += BigUint::from(1u32);
        serial
    }
}
