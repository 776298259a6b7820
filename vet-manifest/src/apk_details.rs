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

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};
use vet_common::*;
use vet_zip::{ApkArchive, ANDROID_MANIFEST, RESOURCE_TABLE};

use crate::{
    android_attributes::attribute_id_for_name,
    resource_table::ResourceTable,
    xml_file::{decode_xml_document, TypedValue, XmlDocument, XmlElement}
};

/// What an APK says about itself. Every field is optional, it is up to the
/// caller to decide which ones it cannot do without.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApkDetails {
    pub package_name: Option<String>,
    pub version_name: Option<String>,
    pub version_code: Option<i64>,
    // Codenames ("Q") are kept as they are
    pub min_sdk_version: Option<String>,
    pub target_sdk_version: Option<String>,
    /// Application label per locale, `""` being the default configuration
    pub labels: BTreeMap<String, String>,
    pub permissions: Vec<String>
}

impl ApkDetails {
    /// The label a user would most likely see: English, then any English
    /// region, then the default, then whatever there is.
    pub fn app_name(&self) -> Option<&str> {
        self.labels
            .get("en")
            .or_else(|| {
                self.labels
                    .iter()
                    .find(|(locale, _)| locale.starts_with("en-"))
                    .map(|(_, label)| label)
            })
            .or_else(|| self.labels.get(""))
            .or_else(|| self.labels.values().next())
            .map(String::as_str)
    }
}

/// The decoded manifest together with the details read from it.
#[derive(Debug, Clone, Serialize)]
pub struct ApkManifest {
    pub details: ApkDetails,
    pub document: XmlDocument
}

pub fn extract_apk_details(apk_bytes: &[u8]) -> Result<ApkDetails> {
    Ok(read_apk_manifest(apk_bytes)?.details)
}

/// Opens the APK and decodes its manifest, resolving resource references
/// through `resources.arsc` when there is one. Only an unreadable archive or
/// manifest is an error.
pub fn read_apk_manifest(apk_bytes: &[u8]) -> Result<ApkManifest> {
    let mut archive = ApkArchive::new(apk_bytes)?;
    let document = decode_xml_document(&archive.read_file(ANDROID_MANIFEST)?)?;

    let table = match archive.read_optional_file(RESOURCE_TABLE)? {
        Some(bytes) => match ResourceTable::parse(&bytes) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Ignoring unreadable {RESOURCE_TABLE}: {e}");
                None
            }
        },
        None => {
            debug!("APK has no {RESOURCE_TABLE}");
            None
        }
    };

    let details = details_from_manifest(&document.root, table.as_ref());
    Ok(ApkManifest { details, document })
}

fn android_attribute<'a>(element: &'a XmlElement, name: &str) -> Option<&'a TypedValue> {
    let id = attribute_id_for_name(name)?;
    element
        .android_attribute(id, name)
        .map(|attribute| &attribute.value)
}

// Every locale's text for a value, references resolved through the table
fn localized_text(value: &TypedValue, table: Option<&ResourceTable>) -> BTreeMap<String, String> {
    let mut texts = BTreeMap::new();
    match value {
        TypedValue::Reference(id) => match table.map(|table| table.resolve_strings(*id)) {
            Some(Ok(resolved)) => {
                for (locale, text) in resolved {
                    texts.entry(locale).or_insert(text);
                }
            }
            Some(Err(e)) => warn!("Could not resolve resource 0x{id:08x}: {e}"),
            None => warn!("Resource 0x{id:08x} referenced without a resource table")
        },
        TypedValue::Null => {}
        other => {
            texts.insert(String::new(), other.to_string());
        }
    }
    texts.retain(|_, text| !text.is_empty());
    texts
}

fn default_text(value: &TypedValue, table: Option<&ResourceTable>) -> Option<String> {
    let mut texts = localized_text(value, table);
    let default = texts.remove("");
    default.or_else(|| texts.into_values().next())
}

fn details_from_manifest(manifest: &XmlElement, table: Option<&ResourceTable>) -> ApkDetails {
    let mut details = ApkDetails {
        package_name: manifest
            .attribute("package")
            .and_then(|attribute| default_text(&attribute.value, table)),
        version_name: android_attribute(manifest, "versionName")
            .and_then(|value| default_text(value, table)),
        version_code: android_attribute(manifest, "versionCode").and_then(TypedValue::as_integer),
        ..Default::default()
    };

    if let Some(uses_sdk) = manifest.children_named("uses-sdk").next() {
        details.min_sdk_version =
            android_attribute(uses_sdk, "minSdkVersion").map(TypedValue::to_string);
        details.target_sdk_version =
            android_attribute(uses_sdk, "targetSdkVersion").map(TypedValue::to_string);
    }

    details.permissions = manifest
        .child_elements()
        .filter(|element| element.name.starts_with("uses-permission"))
        .filter_map(|element| android_attribute(element, "name"))
        .filter_map(|value| value.as_str().map(String::from))
        .collect();

    if let Some(application) = manifest.children_named("application").next() {
        if let Some(label) = android_attribute(application, "label") {
            details.labels = localized_text(label, table);
        }
    }
    if details.labels.is_empty() {
        debug!("Manifest has no usable application label");
    }

    details
}
