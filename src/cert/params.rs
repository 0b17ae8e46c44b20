use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, SetOfVec};
use der::{Tag, Tagged};
use time::{Duration, Month, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{CertDepotError, Result};

/// Attribute types used in the subjects this crate writes.
pub const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
pub const ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const ORGANIZATIONAL_UNIT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// NotBefore is moved back by this much to absorb clock differences between machines.
pub const CLOCK_SKEW_ALLOWANCE: Duration = Duration::minutes(10);

/// Distinguished name parameters for building an X.509 certificate or request.
///
/// # Fields
/// * `country` - The country (C).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
/// * `common_name` - The common name (CN).
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
    #[builder(into)]
    pub common_name: Option<String>,
}

impl DistinguishedName {
    /// Converts the distinguished name to an X.509 `Name`.
    ///
    /// Attributes are written one per RDN in the order C, O, OU, CN; absent
    /// fields are skipped.
    pub fn to_x509_name(&self) -> Result<Name> {
        let attributes = [
            (COUNTRY_NAME, &self.country),
            (ORGANIZATION_NAME, &self.organization),
            (ORGANIZATIONAL_UNIT_NAME, &self.organization_unit),
            (COMMON_NAME, &self.common_name),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in attributes {
            let Some(value) = value else { continue };
            let atv = AttributeTypeAndValue {
                oid,
                value: string_value(value)?,
            };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Reads the known attributes back out of an X.509 `Name`.
    ///
    /// Unknown attribute types and non-string values are ignored; when an
    /// attribute repeats, the first occurrence wins.
    pub fn from_x509_name(name: &Name) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in name.0.iter() {
            for attr in rdn.0.iter() {
                let slot = match attr.oid {
                    COUNTRY_NAME => &mut dn.country,
                    ORGANIZATION_NAME => &mut dn.organization,
                    ORGANIZATIONAL_UNIT_NAME => &mut dn.organization_unit,
                    COMMON_NAME => &mut dn.common_name,
                    _ => continue,
                };
                if slot.is_none() {
                    *slot = decode_string(&attr.value);
                }
            }
        }
        dn
    }
}

fn is_printable(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c))
}

/// PrintableString when the value allows it, UTF8String otherwise.
fn string_value(value: &str) -> Result<Any> {
    let tag = if is_printable(value) {
        Tag::PrintableString
    } else {
        Tag::Utf8String
    };
    Ok(Any::new(tag, value.as_bytes())?)
}

fn decode_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::PrintableString | Tag::Utf8String | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Starts ten minutes in the past and lasts `years` calendar years from now.
    pub fn for_years(years: u32) -> Result<Self> {
        Self::for_years_from(OffsetDateTime::now_utc(), years)
    }

    pub fn for_years_from(now: OffsetDateTime, years: u32) -> Result<Self> {
        Ok(Self {
            not_before: now - CLOCK_SKEW_ALLOWANCE,
            not_after: add_years(now, years)?,
        })
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.not_before <= instant && instant <= self.not_after
    }
}

/// GeneralizedTime has four year digits.
const LAST_ENCODABLE_YEAR: i32 = 9999;

/// Calendar year arithmetic; February 29th rolls over to March 1st in
/// non-leap target years.
fn add_years(instant: OffsetDateTime, years: u32) -> Result<OffsetDateTime> {
    let out_of_range =
        || CertDepotError::EncodingError(format!("validity of {years} years is out of range"));
    let year = i32::try_from(years)
        .ok()
        .and_then(|years| instant.year().checked_add(years))
        .filter(|year| *year <= LAST_ENCODABLE_YEAR)
        .ok_or_else(out_of_range)?;
    instant
        .replace_year(year)
        .or_else(|_| {
            instant
                .replace_day(1)
                .and_then(|t| t.replace_month(Month::March))
                .and_then(|t| t.replace_year(year))
        })
        .map_err(|_| out_of_range())
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Encodes a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: &E,
        critical: bool,
    ) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    pub fn from_x509(extension: &x509_cert::ext::Extension) -> Self {
        Self {
            oid: extension.extn_id,
            critical: extension.critical,
            value: extension.extn_value.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use der::{Decode, Encode};
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_distinguished_name_survives_encoding() {
        let dn = DistinguishedName::builder()
            .country("USA")
            .organization("certdepot")
            .organization_unit("host1")
            .common_name("host1.example.com")
            .build();
        let der = dn.to_x509_name().unwrap().to_der().unwrap();
        let decoded = DistinguishedName::from_x509_name(&Name::from_der(&der).unwrap());
        assert_eq!(dn, decoded);
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let dn = DistinguishedName::builder().organization_unit("CA").build();
        let name = dn.to_x509_name().unwrap();
        assert_eq!(name.0.len(), 1);
        assert_eq!(DistinguishedName::from_x509_name(&name), dn);
    }

    #[test]
    fn test_non_printable_values_use_utf8() {
        let dn = DistinguishedName::builder().organization("Grüße & Co").build();
        let name = dn.to_x509_name().unwrap();
        let attr = name.0[0].0.iter().next().unwrap();
        assert_eq!(attr.value.tag(), Tag::Utf8String);
        assert_eq!(
            DistinguishedName::from_x509_name(&name).organization.as_deref(),
            Some("Grüße & Co")
        );
    }

    #[test]
    fn test_validity_applies_skew_and_years() {
        let now = datetime!(2024-05-10 12:00 UTC);
        let validity = Validity::for_years_from(now, 10).unwrap();
        assert_eq!(validity.not_before, datetime!(2024-05-10 11:50 UTC));
        assert_eq!(validity.not_after, datetime!(2034-05-10 12:00 UTC));
        assert!(validity.contains(now));
        assert!(!validity.contains(datetime!(2034-05-10 12:01 UTC)));
    }

    #[test]
    fn test_leap_day_rolls_forward() {
        let now = datetime!(2024-02-29 08:30 UTC);
        let validity = Validity::for_years_from(now, 1).unwrap();
        assert_eq!(validity.not_after, datetime!(2025-03-01 08:30 UTC));
    }

    #[test]
    fn test_years_past_the_calendar_are_rejected() {
        let now = datetime!(2024-05-10 12:00 UTC);
        let last = Validity::for_years_from(now, 9999 - 2024).unwrap();
        assert_eq!(last.not_after, datetime!(9999-05-10 12:00 UTC));
        for years in [9999 - 2023, 8000, i32::MAX as u32, u32::MAX] {
            assert!(matches!(
                Validity::for_years_from(now, years),
                Err(CertDepotError::EncodingError(_))
            ));
        }
    }
}
