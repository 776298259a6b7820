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

//! # VET API
//!
//! This crate exposes the main public API through which other projects can use
//! VET's APK inspection and verification features.
//!
//! ## Inspecting an APK
//!
//! Reads the manifest, resources and signing certificates. Nothing leaves the
//! process.
//!
//! ```ignore
//! let inspection = inspect_apk(&fs::read("app.apk")?)?;
//! println!("{:?}", inspection.details.app_name());
//! ```
//!
//! ## Verifying an APK
//!
//! Compares what the APK claims against the store's listing for its package
//! name. Any [AppStore] works, `vet-store` provides Google Play.
//!
//! ```ignore
//! let store = PlayStore::new(StoreConfig::default())?;
//! let report = verify_apk(&apk_bytes, &store)?;
//! println!("{}", report::render_text(&report));
//! ```

use serde::Serialize;
use tracing::{debug, warn};
use vet_manifest::{read_apk_manifest, xml_file::XmlDocument};
use vet_sign::extract_certificates;
use vet_verdict::compare_with_store;

pub mod report;

pub use vet_common::{Result, VetError};
pub use vet_manifest::{xml_text::render_xml, ApkDetails};
pub use vet_sign::{CertificateInfo, SignatureScheme};
pub use vet_verdict::{
    compute_verdict, AppStore, Classification, ComparisonOutcome, LocalAppInfo, LookupError, Reason,
    RemoteListing, SearchCandidate, SearchError, Severity, Tone, VerdictResult
};

#[cfg(feature = "fixtures")]
pub use vet_manifest::fixtures as manifest_fixtures;
#[cfg(feature = "fixtures")]
pub use vet_sign::fixtures as sign_fixtures;

/// The signing certificates, or why they could not be read. Missing or broken
/// signatures never stop an inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateReport {
    Found(Vec<CertificateInfo>),
    Unavailable(String)
}

impl CertificateReport {
    fn read(apk_bytes: &[u8]) -> CertificateReport {
        match extract_certificates(apk_bytes) {
            Ok(certificates) => CertificateReport::Found(certificates),
            Err(e) => {
                warn!("Could not read signing certificates: {e}");
                CertificateReport::Unavailable(e.to_string())
            }
        }
    }
}

/// Everything that can be learnt from the APK on its own.
#[derive(Debug, Clone, Serialize)]
pub struct ApkInspection {
    pub details: ApkDetails,
    pub certificates: CertificateReport,
    /// The decoded `AndroidManifest.xml`
    pub manifest: XmlDocument
}

/// The result of a full verification: what the APK says and how it compares
/// to the store.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub local: LocalAppInfo,
    pub details: ApkDetails,
    pub certificates: CertificateReport,
    pub outcome: ComparisonOutcome
}

/// Reads the APK's details, decoded manifest and signing certificates.
///
/// Fails only when the archive or its manifest can't be read.
pub fn inspect_apk(apk_bytes: &[u8]) -> Result<ApkInspection> {
    let manifest = read_apk_manifest(apk_bytes)?;
    debug!("Read details {:?}", manifest.details);
    Ok(ApkInspection {
        details: manifest.details,
        certificates: CertificateReport::read(apk_bytes),
        manifest: manifest.document
    })
}

/// The three fields verification needs. Fails with
/// [VetError::ExtractionIncomplete] naming every missing one.
pub fn local_app_info(details: &ApkDetails) -> Result<LocalAppInfo> {
    LocalAppInfo::from_fields(
        details.app_name(),
        details.package_name.as_deref(),
        details.version_name.as_deref()
    )
    .map_err(|missing| VetError::ExtractionIncomplete { missing })
}

/// Performs all the steps in verifying an APK.
///
/// This includes:
///
///  - Extracting the app name, package name and version from the manifest
///  - Reading the signing certificates
///  - Looking the package up in `store` and scoring the result, or searching
///    for similarly named apps when the package isn't there
///
/// An APK without a usable name, package or version is an error and gets no
/// verdict. Store failures are part of the returned outcome.
pub fn verify_apk(apk_bytes: &[u8], store: &dyn AppStore) -> Result<VerificationReport> {
    let inspection = inspect_apk(apk_bytes)?;
    let local = local_app_info(&inspection.details)?;
    let outcome = compare_with_store(&local, store);
    Ok(VerificationReport {
        local,
        details: inspection.details,
        certificates: inspection.certificates,
        outcome
    })
}
