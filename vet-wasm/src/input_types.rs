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

use serde::{Deserialize, Serialize};
use vet_api::{ApkDetails, CertificateReport, LocalAppInfo, RemoteListing};

#[derive(Debug, Serialize, Deserialize)]
pub struct VetWasmInspectInput {
    pub apk_b64: String
}

/// What the page needs to show an upload and, when the details are complete,
/// to look the package up.
#[derive(Debug, Serialize)]
pub struct VetWasmInspection {
    pub details: ApkDetails,
    pub certificates: CertificateReport,
    /// Present when name, package and version were all found
    pub local: Option<LocalAppInfo>,
    pub extraction_error: Option<String>
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VetWasmVerdictInput {
    pub app_name: String,
    pub version_name: String,
    /// The listing the page fetched, or nothing when the store didn't know
    /// the package.
    #[serde(default)]
    pub listing: Option<RemoteListing>
}
