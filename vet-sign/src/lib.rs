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

use tracing::debug;
use vet_common::*;
use vet_zip::ApkArchive;

use signing_block::{
    read_signing_block, signer_certificates, SIGNATURE_SCHEME_V2_BLOCK_ID,
    SIGNATURE_SCHEME_V3_BLOCK_ID
};
use zip_parser::find_offsets;

pub mod certificate;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod signing_block;
#[cfg(feature = "fixtures")]
mod signing_types;
pub mod v1_signing;
mod zip_parser;
#[cfg(feature = "fixtures")]
mod zip_rebuilder;

pub use certificate::{CertificateInfo, SignatureScheme};

/// Lists the certificates an APK was signed with.
///
/// The newest scheme present wins: v3, then v2 from the APK Signing Block,
/// then the v1 `META-INF` signature files. Nothing is verified, this only
/// reports who claims to have signed the APK.
pub fn extract_certificates(apk_buf: &[u8]) -> Result<Vec<CertificateInfo>> {
    let offsets = find_offsets(apk_buf)?;
    if let Some(block) = read_signing_block(apk_buf, &offsets)? {
        for (scheme, id) in [
            (SignatureScheme::V3, SIGNATURE_SCHEME_V3_BLOCK_ID),
            (SignatureScheme::V2, SIGNATURE_SCHEME_V2_BLOCK_ID)
        ] {
            let Some(scheme_block) = block.value(id) else {
                continue;
            };
            let certificates = signer_certificates(scheme_block)?;
            if !certificates.is_empty() {
                debug!("Using {} certificate(s) from the {scheme} block", certificates.len());
                return describe(scheme, &certificates);
            }
        }
        debug!("Signing block has no v2/v3 signers, trying v1");
    }

    let mut archive = ApkArchive::new(apk_buf)?;
    let certificates = v1_signing::v1_certificates(&mut archive)?;
    if certificates.is_empty() {
        return Err(VetError::NoSignatureFound);
    }
    describe(SignatureScheme::V1, &certificates)
}

fn describe(scheme: SignatureScheme, certificates: &[Vec<u8>]) -> Result<Vec<CertificateInfo>> {
    certificates
        .iter()
        .map(|der| CertificateInfo::from_der(scheme, der))
        .collect()
}
