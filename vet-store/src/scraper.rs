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

//! Reads app details and search results out of Google Play's HTML. The pages
//! embed their data as JSON arrays passed to `AF_initDataCallback`, keyed by
//! dataset name (`ds:5` on details pages, `ds:4` on search pages).

use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use vet_common::*;
use vet_verdict::{details_url, RemoteListing, SearchCandidate};

pub const VARIES_WITH_DEVICE: &str = "Varies with device";

const DETAILS_DATASET: &str = "ds:5";
const SEARCH_DATASET: &str = "ds:4";

// Positions inside the details dataset
const DETAILS_TITLE: &[usize] = &[1, 2, 0, 0];
const DETAILS_DEVELOPER: &[usize] = &[1, 2, 68, 0];
const DETAILS_VERSION: &[usize] = &[1, 2, 140, 0, 0, 0];

// The highlighted top result on a search page, and its fields
const SEARCH_TOP_RESULT: &[usize] = &[0, 1, 0, 23, 16];
const TOP_RESULT_APP_ID: &[usize] = &[11, 0, 0];
const TOP_RESULT_TITLE: &[usize] = &[2, 0, 0];
const TOP_RESULT_DEVELOPER: &[usize] = &[2, 68, 0];
// Regular results, relative to one entry of the section list
const SECTION_RESULTS: &[usize] = &[22, 0];
const RESULT_APP_ID: &[usize] = &[0, 0, 0];
const RESULT_TITLE: &[usize] = &[0, 3];
const RESULT_DEVELOPER: &[usize] = &[0, 14];

struct Patterns {
    script: Regex,
    key: Regex,
    value: Regex
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        script: Regex::new(r"AF_initDataCallback[\s\S]*?</script").unwrap(),
        key: Regex::new(r"(ds:.*?)'").unwrap(),
        value: Regex::new(r"data:([\s\S]*?), sideChannel: \{\}\}\);</").unwrap()
    })
}

/// Every `AF_initDataCallback` dataset on the page that parses as JSON.
pub fn extract_datasets(html: &str) -> HashMap<String, Value> {
    let patterns = patterns();
    let mut datasets = HashMap::new();
    for script in patterns.script.find_iter(html) {
        let script = script.as_str();
        let (Some(key), Some(value)) = (patterns.key.captures(script), patterns.value.captures(script)) else {
            continue;
        };
        match serde_json::from_str::<Value>(&value[1]) {
            Ok(data) => {
                datasets.insert(key[1].to_string(), data);
            }
            Err(e) => debug!("Skipping dataset {} that isn't JSON: {e}", &key[1])
        }
    }
    datasets
}

fn nested<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |value, index| value.get(*index))
}

fn nested_str(value: &Value, path: &[usize]) -> Option<String> {
    nested(value, path)
        .and_then(Value::as_str)
        .map(String::from)
}

fn dataset<'a>(datasets: &'a HashMap<String, Value>, key: &str) -> Result<&'a Value> {
    datasets
        .get(key)
        .ok_or_else(|| VetError::StorePageParsingFailed(format!("page has no {key} dataset")))
}

pub fn parse_details(html: &str, app_id: &str) -> Result<RemoteListing> {
    let datasets = extract_datasets(html);
    let details = dataset(&datasets, DETAILS_DATASET)?;
    let field = |name: &str, path: &[usize]| {
        nested_str(details, path).ok_or_else(|| {
            VetError::StorePageParsingFailed(format!("details page has no {name}"))
        })
    };
    Ok(RemoteListing {
        title: field("title", DETAILS_TITLE)?,
        developer: field("developer", DETAILS_DEVELOPER)?,
        // Apps with per-device builds don't publish a single version
        version: nested_str(details, DETAILS_VERSION).unwrap_or_else(|| VARIES_WITH_DEVICE.to_string()),
        url: details_url(app_id)
    })
}

fn candidate(entry: &Value, app_id: &[usize], title: &[usize], developer: &[usize]) -> Option<SearchCandidate> {
    Some(SearchCandidate {
        app_id: nested_str(entry, app_id)?,
        title: nested_str(entry, title)?,
        developer: nested_str(entry, developer).unwrap_or_default()
    })
}

/// Search results in page order, the highlighted top result first. A page
/// without results gives an empty list.
pub fn parse_search(html: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
    let datasets = extract_datasets(html);
    let Some(results) = datasets.get(SEARCH_DATASET) else {
        // Searches that match nothing leave the dataset out entirely
        debug!("Search page has no {SEARCH_DATASET} dataset");
        return Ok(vec![]);
    };

    let mut candidates: Vec<SearchCandidate> = vec![];
    if let Some(top) = nested(results, SEARCH_TOP_RESULT)
        .and_then(|top| candidate(top, TOP_RESULT_APP_ID, TOP_RESULT_TITLE, TOP_RESULT_DEVELOPER))
    {
        candidates.push(top);
    }

    // The section holding the result list moves around between locales
    let sections = nested(results, &[0, 1])
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let listed = sections
        .iter()
        .find_map(|section| nested(section, SECTION_RESULTS).and_then(Value::as_array));
    for entry in listed.into_iter().flatten() {
        if candidates.len() >= limit {
            break;
        }
        let Some(found) = candidate(entry, RESULT_APP_ID, RESULT_TITLE, RESULT_DEVELOPER) else {
            continue;
        };
        if !candidates.iter().any(|existing| existing.app_id == found.app_id) {
            candidates.push(found);
        }
    }

    candidates.truncate(limit);
    Ok(candidates)
}
