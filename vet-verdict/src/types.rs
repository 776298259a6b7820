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
use thiserror::Error;

/// The identity an APK claims for itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAppInfo {
    pub app_name: String,
    pub package_name: String,
    pub version_name: String
}

impl LocalAppInfo {
    /// Builds the record only when every field is present and non-empty,
    /// otherwise returns the names of the missing ones.
    pub fn from_fields(
        app_name: Option<&str>,
        package_name: Option<&str>,
        version_name: Option<&str>
    ) -> Result<LocalAppInfo, Vec<&'static str>> {
        fn present(field: Option<&str>) -> Option<&str> {
            field.map(str::trim).filter(|value| !value.is_empty())
        }
        let mut missing = vec![];
        for (name, field) in [
            ("app name", app_name),
            ("package name", package_name),
            ("version", version_name)
        ] {
            if present(field).is_none() {
                missing.push(name);
            }
        }
        match (present(app_name), present(package_name), present(version_name)) {
            (Some(app_name), Some(package_name), Some(version_name)) => Ok(LocalAppInfo {
                app_name: app_name.to_string(),
                package_name: package_name.to_string(),
                version_name: version_name.to_string()
            }),
            _ => Err(missing)
        }
    }
}

/// The store's canonical record for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub title: String,
    pub version: String,
    pub developer: String,
    pub url: String
}

/// The canonical store details page for an app.
pub fn details_url(app_id: &str) -> String {
    format!("https://play.google.com/store/apps/details?id={app_id}")
}

/// One result of a store search, in the store's ranking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub title: String,
    pub developer: String,
    pub app_id: String
}

/// Why a lookup produced no listing. Store clients decide which one applies.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LookupError {
    /// The store has no app with this package name.
    #[error("The app was not found on the store")]
    NotFound,
    /// Transport, timeout, unexpected status or an unreadable page.
    #[error("{0}")]
    Failed(String)
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{0}")]
pub struct SearchError(pub String);
