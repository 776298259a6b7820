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

//! Most of this package is concerned with APK Signature Scheme v2 and v3,
//! but this module handles Signature Scheme v1, aka. Signed JAR File format.

use rasn::types::Oid;
use rasn_cms::{
    pkcs7_compat::SignedData, Certificate, CertificateChoices, ContentInfo, SignerIdentifier
};
use tracing::debug;
use vet_common::*;
use vet_zip::ApkArchive;

pub(crate) const OID_PKCS7_SIGNED_DATA: &Oid =
    rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;
const SIGNATURE_BLOCK_EXTENSIONS: &[&str] = &["RSA", "DSA", "EC"];

/// Signature block files sit directly in `META-INF/`, named after the signer.
pub fn is_signature_block_file(name: &str) -> bool {
    let Some(file_name) = name.strip_prefix("META-INF/") else {
        return false;
    };
    if file_name.contains('/') {
        return false;
    }
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, extension)| {
            SIGNATURE_BLOCK_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
}

fn names_signer(signed_data: &SignedData, certificate: &Certificate) -> bool {
    signed_data.signer_infos.to_vec().iter().any(|signer| match &signer.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => {
            id.issuer == certificate.tbs_certificate.issuer
                && id.serial_number == certificate.tbs_certificate.serial_number
        }
        SignerIdentifier::SubjectKeyIdentifier(_) => false
    })
}

/// Returns the DER certificates in a PKCS#7 `SignedData` signature block,
/// BER or DER. The certificate set has no order of its own, so certificates
/// named by a signer come first, each group sorted by encoding.
pub fn certificates_from_pkcs7(signature_block: &[u8]) -> Result<Vec<Vec<u8>>> {
    let info: ContentInfo = rasn::ber::decode(signature_block)?;
    if &*info.content_type != OID_PKCS7_SIGNED_DATA {
        return Err(VetError::DerParsingFailed(
            "signature block is not PKCS#7 SignedData".into()
        ));
    }
    let signed_data: SignedData = rasn::ber::decode(info.content.as_bytes())?;

    let mut signers = vec![];
    let mut others = vec![];
    let choices = signed_data
        .certificates
        .as_ref()
        .map(|set| set.to_vec())
        .unwrap_or_default();
    for choice in choices {
        // Attribute certificates and other formats don't identify a signer
        let CertificateChoices::Certificate(certificate) = choice else {
            continue;
        };
        let der = rasn::der::encode(&**certificate)?;
        if names_signer(&signed_data, certificate) {
            signers.push(der);
        } else {
            others.push(der);
        }
    }
    signers.sort();
    others.sort();
    signers.extend(others);
    Ok(signers)
}

/// Collects the certificates of every v1 signer, in file name order.
pub fn v1_certificates(archive: &mut ApkArchive) -> Result<Vec<Vec<u8>>> {
    let mut certificates = vec![];
    for name in archive.find_files(is_signature_block_file) {
        debug!("Reading v1 signature block {name}");
        let signature_block = archive.read_file(&name)?;
        certificates.extend(certificates_from_pkcs7(&signature_block)?);
    }
    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{generate_certificate, pkcs7_signature_block};

    #[test]
    fn recognises_signature_block_names() {
        assert!(is_signature_block_file("META-INF/CERT.RSA"));
        assert!(is_signature_block_file("META-INF/release.ec"));
        assert!(!is_signature_block_file("META-INF/CERT.SF"));
        assert!(!is_signature_block_file("META-INF/nested/CERT.RSA"));
        assert!(!is_signature_block_file("assets/CERT.RSA"));
    }

    // Splits a definite-length TLV into the whole TLV and its contents
    fn split_tlv(tlv: &[u8]) -> (&[u8], &[u8]) {
        let (length, header) = match tlv[1] {
            short if short < 0x80 => (short as usize, 2),
            long => {
                let count = (long & 0x7F) as usize;
                let length = tlv[2..2 + count]
                    .iter()
                    .fold(0usize, |length, byte| length << 8 | *byte as usize);
                (length, 2 + count)
            }
        };
        (&tlv[..header + length], &tlv[header..header + length])
    }

    fn indefinite(tag: u8, contents: &[u8]) -> Vec<u8> {
        let mut tlv = vec![tag, 0x80];
        tlv.extend(contents);
        tlv.extend([0, 0]);
        tlv
    }

    // Re-encodes ContentInfo, its [0] wrapper and SignedData with
    // indefinite lengths, the way jarsigner and friends write them
    fn to_indefinite_ber(block: &[u8]) -> Vec<u8> {
        let (_, info) = split_tlv(block);
        let (content_type, _) = split_tlv(info);
        let (_, explicit) = split_tlv(&info[content_type.len()..]);
        let (_, signed_data) = split_tlv(explicit);

        let mut contents = content_type.to_vec();
        contents.extend(indefinite(0xA0, &indefinite(0x30, signed_data)));
        indefinite(0x30, &contents)
    }

    #[test]
    fn extracts_certificates_from_signed_data() {
        let signer = generate_certificate("Signer", "Example Org");
        let chain = generate_certificate("Chain", "Example Org");
        let block = pkcs7_signature_block(&[signer.clone(), chain.clone()]);
        // The signer info names the first certificate, so it leads
        assert_eq!(certificates_from_pkcs7(&block).unwrap(), vec![signer, chain]);
    }

    #[test]
    fn reads_indefinite_length_ber() {
        let certificate = generate_certificate("Legacy Signer", "Example Org");
        let block = to_indefinite_ber(&pkcs7_signature_block(&[certificate.clone()]));
        assert_eq!(&block[..2], &[0x30, 0x80]);
        assert_eq!(certificates_from_pkcs7(&block).unwrap(), vec![certificate]);
    }

    #[test]
    fn rejects_non_pkcs7_input() {
        assert!(certificates_from_pkcs7(b"not der at all").is_err());
    }
}
