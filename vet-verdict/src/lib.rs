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

//! # VET Verdict
//!
//! Decides how much to trust an APK by comparing the name and version it
//! claims against the store's listing for its package name.

pub mod orchestrator;
pub mod types;
pub mod verdict;

pub use orchestrator::{
    compare_with_store, orchestrate_comparison, AppStore, ComparisonOutcome, FALLBACK_SEARCH_LIMIT
};
pub use types::{details_url, LocalAppInfo, LookupError, RemoteListing, SearchCandidate, SearchError};
pub use verdict::{
    compute_verdict, Classification, Reason, Severity, Tone, VerdictResult, GENUINE_THRESHOLD,
    MAJOR_NAME_PENALTY, MINOR_NAME_PENALTY, NOT_FOUND_PENALTY, STARTING_SCORE,
    SUSPICIOUS_THRESHOLD, VERSION_PENALTY
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serialises_for_front_ends() {
        let verdict = compute_verdict("Foo", "1.0", None);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["score"], 50);
        assert_eq!(json["classification"], "SUSPICIOUS");
        assert_eq!(json["reasons"][0], "NotOnStore");
    }
}
