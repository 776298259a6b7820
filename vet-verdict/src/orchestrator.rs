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
use tracing::{debug, warn};

use crate::{
    types::{LocalAppInfo, LookupError, RemoteListing, SearchCandidate, SearchError},
    verdict::{compute_verdict, VerdictResult}
};

/// How many similar apps to look for when the package isn't on the store.
pub const FALLBACK_SEARCH_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComparisonOutcome {
    /// The store knows the package: compare side by side.
    DirectComparison {
        verdict: VerdictResult,
        local: LocalAppInfo,
        listing: RemoteListing
    },
    /// The package isn't on the store. `candidates` may be empty, which means
    /// no similar apps were found.
    FallbackSearch {
        verdict: VerdictResult,
        query: String,
        candidates: Vec<SearchCandidate>
    },
    /// The package isn't on the store and searching for similar apps failed.
    FallbackSearchFailed {
        verdict: VerdictResult,
        query: String,
        message: String
    },
    /// The store could not be asked at all, so there is no verdict.
    OrchestratorError { message: String }
}

impl ComparisonOutcome {
    pub fn verdict(&self) -> Option<&VerdictResult> {
        match self {
            ComparisonOutcome::DirectComparison { verdict, .. }
            | ComparisonOutcome::FallbackSearch { verdict, .. }
            | ComparisonOutcome::FallbackSearchFailed { verdict, .. } => Some(verdict),
            ComparisonOutcome::OrchestratorError { .. } => None
        }
    }
}

/// Looks the package up and scores the APK against what comes back, falling
/// back to a name search when the store has never heard of the package.
///
/// Any lookup failure other than [LookupError::NotFound] ends the comparison
/// without a verdict, and `search` is never called.
pub fn orchestrate_comparison<L, S>(
    app_name: &str,
    package_name: &str,
    version_name: &str,
    lookup: L,
    search: S
) -> ComparisonOutcome
where
    L: FnOnce(&str) -> Result<RemoteListing, LookupError>,
    S: FnOnce(&str, usize) -> Result<Vec<SearchCandidate>, SearchError>
{
    debug!(package_name, "Looking up package on the store");
    match lookup(package_name) {
        Ok(listing) => {
            debug!(title = %listing.title, version = %listing.version, "Found store listing");
            let verdict = compute_verdict(app_name, version_name, Some(&listing));
            ComparisonOutcome::DirectComparison {
                verdict,
                local: LocalAppInfo {
                    app_name: app_name.to_string(),
                    package_name: package_name.to_string(),
                    version_name: version_name.to_string()
                },
                listing
            }
        }
        Err(LookupError::NotFound) => {
            debug!(package_name, "Package not on the store, searching by name");
            let verdict = compute_verdict(app_name, version_name, None);
            match search(app_name, FALLBACK_SEARCH_LIMIT) {
                Ok(mut candidates) => {
                    debug!(found = candidates.len(), "Fallback search finished");
                    candidates.truncate(FALLBACK_SEARCH_LIMIT);
                    ComparisonOutcome::FallbackSearch {
                        verdict,
                        query: app_name.to_string(),
                        candidates
                    }
                }
                Err(SearchError(message)) => {
                    warn!("Fallback search for {app_name:?} failed: {message}");
                    ComparisonOutcome::FallbackSearchFailed {
                        verdict,
                        query: app_name.to_string(),
                        message
                    }
                }
            }
        }
        Err(LookupError::Failed(message)) => {
            warn!("Store lookup for {package_name} failed: {message}");
            ComparisonOutcome::OrchestratorError { message }
        }
    }
}

/// A store that can look packages up and search by name.
pub trait AppStore {
    fn lookup(&self, package_name: &str) -> Result<RemoteListing, LookupError>;
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchCandidate>, SearchError>;
}

pub fn compare_with_store(local: &LocalAppInfo, store: &dyn AppStore) -> ComparisonOutcome {
    orchestrate_comparison(
        &local.app_name,
        &local.package_name,
        &local.version_name,
        |package_name| store.lookup(package_name),
        |query, limit| store.search(query, limit)
    )
}
