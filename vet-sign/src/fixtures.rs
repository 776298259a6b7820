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

//! Signed test APKs. Only compiled with the `fixtures` feature.

use deku::DekuContainerWrite;
use rasn::types::{Integer::Primitive, Oid};
use rasn_cms::{
    algorithms::RSA, pkcs7_compat::SignedData as Pkcs7SignedData, Certificate,
    CertificateChoices, ContentInfo, IssuerAndSerialNumber, SignerIdentifier, SignerInfo
};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use vet_common::*;
use vet_zip::{zip_apk_to_vec, File};

use crate::{
    signing_block::{APK_SIGNING_BLOCK_MAGIC, SIGNATURE_SCHEME_V2_BLOCK_ID, SIGNATURE_SCHEME_V3_BLOCK_ID},
    signing_types::*,
    v1_signing::OID_PKCS7_SIGNED_DATA,
    zip_parser::find_offsets,
    zip_rebuilder::rebuild_zip_with_signing_block
};

const OID_SHA256: &Oid =
    rasn::types::Oid::JOINT_ISO_ITU_T_COUNTRY_US_ORGANIZATION_GOV_CSOR_NIST_ALGORITHMS_HASH_SHA256;
const OID_PKCS7_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
// RSASSA-PKCS1-v1_5 with SHA2-256
const SIGNATURE_ALGORITHM_ID: u32 = 0x0103;

/// Self-signs a throwaway X.509 certificate for `CN=<common_name>,
/// O=<organization>, C=US` and returns it in DER form.
pub fn generate_certificate(common_name: &str, organization: &str) -> Vec<u8> {
    let key_pair = KeyPair::generate().unwrap();
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CountryName, "US");
    distinguished_name.push(DnType::OrganizationName, organization);
    distinguished_name.push(DnType::CommonName, common_name);
    let mut cert_params = CertificateParams::new(vec![]).unwrap();
    cert_params.distinguished_name = distinguished_name;
    let cert = cert_params.self_signed(&key_pair).unwrap();
    cert.der().to_vec()
}

/// A minimal, unsigned zip to sign.
pub fn unsigned_apk() -> Vec<u8> {
    zip_apk_to_vec(&[File {
        path: "classes.dex".into(),
        data: b"dex\n035\0".to_vec()
    }])
    .unwrap()
}

// Nothing reads digests or signatures back, so zeros do
fn placeholder(length: usize) -> Result<Sequence<AlgorithmValue>> {
    sequence(vec![AlgorithmValue {
        algorithm_id: SIGNATURE_ALGORITHM_ID,
        value: Prefixed32::new(vec![0; length])?
    }])
}

fn scheme_block(id: u32, certificates: &[Vec<u8>]) -> Result<Vec<u8>> {
    let sdk_range = (id == SIGNATURE_SCHEME_V3_BLOCK_ID).then_some(SdkRange {
        min_sdk: 24,
        max_sdk: 0x7FFF_FFFF
    });
    let signer = SignerRecord {
        signed_data: Prefixed32::new(SignedDataRecord {
            digests: placeholder(32)?,
            certificates: sequence(certificates.to_vec())?,
            sdk_range,
            additional_attributes: 0
        })?,
        sdk_range,
        signatures: placeholder(256)?,
        public_key: Prefixed32::new(vec![])?
    };
    SchemeBlockRecord {
        signers: sequence(vec![signer])?
    }
    .to_bytes()
    .map_err(VetError::ByteSerialisationFailed)
}

/// Encodes an APK Signing Block with one scheme block per ID in
/// `scheme_ids`, each carrying one signer with `certificates`.
pub fn signing_block(scheme_ids: &[u32], certificates: &[Vec<u8>]) -> Result<Vec<u8>> {
    let pairs = scheme_ids
        .iter()
        .map(|id| {
            Prefixed64::new(SchemePair {
                id: *id,
                value: scheme_block(*id, certificates)?
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let pairs_length: u64 = pairs.iter().map(|pair| 8 + pair.length).sum();
    // Plus size_of_self_counted and the magic
    let block_size = pairs_length + 8 + 16;

    SigningBlockRecord {
        size_of_self_not_counted: block_size,
        pairs,
        size_of_self_counted: block_size,
        magic: *APK_SIGNING_BLOCK_MAGIC
    }
    .to_bytes()
    .map_err(VetError::ByteSerialisationFailed)
}

/// Adds a v2 and/or v3 signing block to an existing zip.
pub fn sign_apk(apk: &[u8], v2: bool, v3: bool, certificates: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut scheme_ids = vec![];
    if v2 {
        scheme_ids.push(SIGNATURE_SCHEME_V2_BLOCK_ID);
    }
    if v3 {
        scheme_ids.push(SIGNATURE_SCHEME_V3_BLOCK_ID);
    }
    let offsets = find_offsets(apk)?;
    rebuild_zip_with_signing_block(&offsets, apk, &signing_block(&scheme_ids, certificates)?)
}

/// A PKCS#7 `SignedData` the way `META-INF/CERT.RSA` holds it. The signer
/// info names the first certificate and carries a placeholder signature.
pub fn pkcs7_signature_block(certificates: &[Vec<u8>]) -> Vec<u8> {
    let certs: Vec<Certificate> = certificates
        .iter()
        .map(|der| rasn::der::decode(der).unwrap())
        .collect();

    let signer_info = SignerInfo {
        version: Primitive(1),
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certs[0].tbs_certificate.issuer.clone(),
            serial_number: certs[0].tbs_certificate.serial_number.clone()
        }),
        digest_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None
        },
        signed_attrs: None,
        signature_algorithm: rasn_cms::AlgorithmIdentifier {
            algorithm: RSA.into(),
            parameters: None
        },
        signature: vec![0u8; 256].into(),
        unsigned_attrs: None
    };

    let signed_data = Pkcs7SignedData {
        version: Primitive(1),
        digest_algorithms: vec![rasn_cms::AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None
        }]
        .into(),
        encap_content_info: rasn_cms::pkcs7_compat::EncapsulatedContentInfo {
            content_type: OID_PKCS7_DATA.into(),
            content: None
        },
        certificates: Some(
            certs
                .into_iter()
                .map(|cert| CertificateChoices::Certificate(Box::new(cert)))
                .collect::<Vec<_>>()
                .into()
        ),
        crls: None,
        signer_infos: vec![signer_info].into()
    };

    let wrapper = ContentInfo {
        content_type: OID_PKCS7_SIGNED_DATA.into(),
        content: rasn::types::Any::new(rasn::der::encode(&signed_data).unwrap())
    };
    rasn::der::encode(&wrapper).unwrap()
}

/// Adds `META-INF/CERT.RSA` (and the usual companions) to an APK's entries.
pub fn add_v1_signature_files(files: &mut Vec<File>, certificates: &[Vec<u8>]) {
    files.push(File {
        path: "META-INF/MANIFEST.MF".into(),
        data: b"Manifest-Version: 1.0\r\n\r\n".to_vec()
    });
    files.push(File {
        path: "META-INF/CERT.SF".into(),
        data: b"Signature-Version: 1.0\r\n\r\n".to_vec()
    });
    files.push(File {
        path: "META-INF/CERT.RSA".into(),
        data: pkcs7_signature_block(certificates)
    });
}
