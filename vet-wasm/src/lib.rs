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

use base64::{engine::general_purpose, Engine};
use input_types::{VetWasmInspectInput, VetWasmInspection, VetWasmVerdictInput};
use serde::Serialize;
use vet_api::{compute_verdict, inspect_apk, local_app_info, VerdictResult};
use wasm_bindgen::prelude::*;

mod input_types;

// Reads an uploaded APK, sent as Base64, and returns what it says about itself
#[wasm_bindgen]
pub fn inspect(input: JsValue) -> std::result::Result<JsValue, String> {
    let input: VetWasmInspectInput = serde_wasm_bindgen::from_value(input)
        .map_err(|e| format!("JS object input did not match expected format\n{:?}", e))?;
    to_js(&inspect_b64(&input.apk_b64)?)
}

// Scores the uploaded APK against the listing the page fetched itself
#[wasm_bindgen]
pub fn verdict(input: JsValue) -> std::result::Result<JsValue, String> {
    let input: VetWasmVerdictInput = serde_wasm_bindgen::from_value(input)
        .map_err(|e| format!("JS object input did not match expected format\n{:?}", e))?;
    to_js(&verdict_for(&input))
}

fn inspect_b64(apk_b64: &str) -> std::result::Result<VetWasmInspection, String> {
    let inspection = inspect_apk(&b64_to_bytes(apk_b64)?)?;
    let (local, extraction_error) = match local_app_info(&inspection.details) {
        Ok(local) => (Some(local), None),
        Err(e) => (None, Some(e.to_string()))
    };
    Ok(VetWasmInspection {
        details: inspection.details,
        certificates: inspection.certificates,
        local,
        extraction_error
    })
}

fn verdict_for(input: &VetWasmVerdictInput) -> VerdictResult {
    compute_verdict(&input.app_name, &input.version_name, input.listing.as_ref())
}

fn to_js<T: Serialize>(value: &T) -> std::result::Result<JsValue, String> {
    serde_wasm_bindgen::to_value(value).map_err(|e| format!("Failed to convert output for JS\n{:?}", e))
}

fn b64_to_bytes(b64: &str) -> std::result::Result<Vec<u8>, String> {
    // Slightly unusual API
    general_purpose::STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| format!("Failed to decode Base64\n{:?}", e))
}
