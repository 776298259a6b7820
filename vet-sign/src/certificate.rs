// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use rasn::types::{Any, Ia5String};
use rasn_pkix::{AttributeTypeAndValue, Certificate, DirectoryString, Name};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use vet_common::*;

/// Where in the APK a certificate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// Signed JAR (`META-INF/*.RSA` and friends)
    V1,
    /// APK Signature Scheme v2
    V2,
    /// APK Signature Scheme v3
    V3
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignatureScheme::V1 => "v1 (JAR signing)",
            SignatureScheme::V2 => "v2 (APK Signature Scheme v2)",
            SignatureScheme::V3 => "v3 (APK Signature Scheme v3)"
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub scheme: SignatureScheme,
    pub subject: String,
    pub issuer: String,
    /// SHA-256 of the DER encoding, as `AB:CD:...`
    pub sha256_fingerprint: String
}

impl CertificateInfo {
    pub fn from_der(scheme: SignatureScheme, der: &[u8]) -> Result<CertificateInfo> {
        let certificate: Certificate = rasn::der::decode(der)?;
        Ok(CertificateInfo {
            scheme,
            subject: render_name(&certificate.tbs_certificate.subject),
            issuer: render_name(&certificate.tbs_certificate.issuer),
            sha256_fingerprint: fingerprint(der)
        })
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

pub fn fingerprint(der: &[u8]) -> String {
    let digest = hex::encode_upper(Sha256::digest(der));
    digest
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

fn attribute_short_name(oid: &str) -> Option<&'static str> {
    Some(match oid {
        "2.5.4.3" => "CN",
        "2.5.4.5" => "SERIALNUMBER",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "1.2.840.113549.1.9.1" => "E",
        "0.9.2342.19200300.100.1.25" => "DC",
        _ => return None
    })
}

fn value_text(value: &Any) -> Option<String> {
    if let Ok(string) = rasn::ber::decode::<DirectoryString>(value.as_bytes()) {
        return Some(match string {
            // TeletexString, close enough to Latin-1 in practice
            DirectoryString::Teletex(teletex) => teletex
                .to_bytes()
                .chunks_exact(4)
                .filter_map(|code| {
                    char::from_u32(u32::from_be_bytes([code[0], code[1], code[2], code[3]]))
                })
                .collect(),
            DirectoryString::Printable(printable) => {
                String::from_utf8_lossy(printable.as_bytes()).into_owned()
            }
            DirectoryString::Universal(universal) => universal.value,
            DirectoryString::Utf8(utf8) => utf8,
            DirectoryString::Bmp(bmp) => {
                let units: Vec<u16> = bmp
                    .to_bytes()
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        });
    }
    // Email addresses and domain components
    rasn::ber::decode::<Ia5String>(value.as_bytes())
        .ok()
        .map(|ia5| ia5.to_string())
}

fn render_attribute(attribute: &AttributeTypeAndValue) -> String {
    let oid = attribute.r#type.to_string();
    let key = attribute_short_name(&oid).map_or(oid, str::to_string);
    match value_text(&attribute.value) {
        Some(text) => format!("{key}={}", escape_value(&text)),
        None => format!("{key}=#{}", hex::encode(attribute.value.as_bytes()))
    }
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == '#' || c == ' ');
        if leading || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders a distinguished name in RFC 4514 order (most specific first),
/// e.g. `CN=Example, O=Example Corp, C=US`. Values of a multi-valued RDN are
/// sorted, since the set keeps no order.
pub fn render_name(name: &Name) -> String {
    let Name::RdnSequence(rdns) = name;
    let mut rendered: Vec<String> = rdns
        .iter()
        .map(|rdn| {
            let mut parts: Vec<String> = rdn.to_vec().into_iter().map(render_attribute).collect();
            parts.sort();
            parts.join("+")
        })
        .collect();
    rendered.reverse();
    rendered.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rasn::types::SetOf;
    use crate::fixtures::generate_certificate;

    #[test]
    fn describes_generated_certificate() {
        let der = generate_certificate("Example Dev", "Example Org");
        let info = CertificateInfo::from_der(SignatureScheme::V2, &der).unwrap();
        assert_eq!(info.subject, "CN=Example Dev, O=Example Org, C=US");
        assert!(info.is_self_signed());
        assert_eq!(info.sha256_fingerprint.len(), 32 * 3 - 1);
        assert_eq!(info.sha256_fingerprint, fingerprint(&der));
    }

    #[test]
    fn fingerprint_is_colon_separated_upper_hex() {
        // SHA-256 of the empty string
        assert!(fingerprint(b"").starts_with("E3:B0:C4:42:98:FC"));
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_value("Acme, Inc."), "Acme\\, Inc.");
        assert_eq!(escape_value("#1"), "\\#1");
    }

    fn attribute(arcs: &'static [u32], value: &[u8]) -> AttributeTypeAndValue {
        AttributeTypeAndValue {
            r#type: rasn::types::ObjectIdentifier::new(arcs).unwrap(),
            value: Any::new(value.to_vec())
        }
    }

    #[test]
    fn decodes_string_types() {
        // BMPString
        assert_eq!(
            value_text(&Any::new(vec![0x1E, 0x04, 0x00, 0x41, 0x00, 0x42])).as_deref(),
            Some("AB")
        );
        // IA5String
        assert_eq!(
            value_text(&Any::new(vec![0x16, 0x03, b'a', b'@', b'b'])).as_deref(),
            Some("a@b")
        );
        // OCTET STRING has no text form
        assert_eq!(value_text(&Any::new(vec![0x04, 0x01, 0xAB])), None);
    }

    #[test]
    fn renders_multi_valued_and_unknown_attributes() {
        let name = Name::RdnSequence(vec![
            SetOf::from(vec![attribute(&[2, 5, 4, 6], &[0x13, 0x02, b'U', b'S'])]).into(),
            SetOf::from(vec![
                attribute(&[2, 5, 4, 11], &[0x0C, 0x02, b'Q', b'A']),
                attribute(&[2, 5, 4, 3], &[0x0C, 0x04, b'A', b',', b' ', b'B'])
            ])
            .into(),
            SetOf::from(vec![attribute(&[1, 3, 6, 1, 4, 1, 99], &[0x04, 0x01, 0x01])]).into()
        ]);
        assert_eq!(render_name(&name), "1.3.6.1.4.1.99=#040101, CN=A\\, B+OU=QA, C=US");
    }

    #[test]
    fn garbage_is_not_a_certificate() {
        assert!(matches!(
            CertificateInfo::from_der(SignatureScheme::V1, &[0x30, 0x03, 0x02, 0x01, 0x01]),
            Err(VetError::CertificateDecodingFailed(_))
        ));
    }
}
