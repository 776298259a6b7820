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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::RemoteListing;

pub const STARTING_SCORE: i32 = 100;
pub const NOT_FOUND_PENALTY: i32 = 50;
pub const MINOR_NAME_PENALTY: i32 = 15;
pub const MAJOR_NAME_PENALTY: i32 = 40;
pub const VERSION_PENALTY: i32 = 20;
/// Lowest score still classified [Classification::Genuine]
pub const GENUINE_THRESHOLD: i32 = 90;
/// Lowest score still classified [Classification::Suspicious]
pub const SUSPICIOUS_THRESHOLD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Ok,
    Warning,
    Critical
}

impl Severity {
    pub fn marker(self) -> &'static str {
        match self {
            Severity::Ok => "[ok]",
            Severity::Warning => "[!]",
            Severity::Critical => "[x]"
        }
    }
}

/// One line of the verdict's rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    NotOnStore,
    NameMatch,
    MinorNameMismatch { local: String, store: String },
    MajorNameMismatch { local: String, store: String },
    VersionMatch { version: String },
    VersionMismatch { local: String, store: String },
    Developer { developer: String }
}

impl Reason {
    pub fn severity(&self) -> Severity {
        match self {
            Reason::NotOnStore | Reason::MajorNameMismatch { .. } => Severity::Critical,
            Reason::MinorNameMismatch { .. } | Reason::VersionMismatch { .. } => Severity::Warning,
            Reason::NameMatch | Reason::VersionMatch { .. } | Reason::Developer { .. } => Severity::Ok
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NotOnStore => write!(
                f,
                "App Not Found on Play Store: The package name does not exist on the official \
                 Google Play Store. This is a major red flag."
            ),
            Reason::NameMatch => write!(
                f,
                "App Name Match: The app name is consistent with the Play Store listing."
            ),
            Reason::MinorNameMismatch { local, store } => write!(
                f,
                "Minor Name Mismatch: APK name is '{local}', Play Store name is '{store}'."
            ),
            Reason::MajorNameMismatch { local, store } => write!(
                f,
                "Major Name Mismatch: APK name ('{local}') is very different from the Play Store \
                 name ('{store}')."
            ),
            Reason::VersionMatch { version } => write!(
                f,
                "Version Match: The APK version ({version}) is the latest available on the Play Store."
            ),
            Reason::VersionMismatch { local, store } => write!(
                f,
                "Version Mismatch: APK version is {local}, but the latest on the Play Store is \
                 {store}. This could be an old or modified version."
            ),
            Reason::Developer { developer } => write!(
                f,
                "Official Developer: The developer on the Play Store is {developer}."
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Positive,
    Cautionary,
    Negative
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Genuine,
    Suspicious,
    LikelyFake
}

impl Classification {
    pub fn from_score(score: i32) -> Classification {
        if score >= GENUINE_THRESHOLD {
            Classification::Genuine
        } else if score >= SUSPICIOUS_THRESHOLD {
            Classification::Suspicious
        } else {
            Classification::LikelyFake
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::Genuine => "Likely Genuine",
            Classification::Suspicious => "Potentially Outdated or Modified",
            Classification::LikelyFake => "Potentially Fake or Unofficial"
        }
    }

    pub fn tone(self) -> Tone {
        match self {
            Classification::Genuine => Tone::Positive,
            Classification::Suspicious => Tone::Cautionary,
            Classification::LikelyFake => Tone::Negative
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictResult {
    pub score: i32,
    pub classification: Classification,
    pub reasons: Vec<Reason>
}

/// Scores an APK's name and version against its store listing.
///
/// Deductions start from [STARTING_SCORE]: [NOT_FOUND_PENALTY] without a
/// listing, [MINOR_NAME_PENALTY] when one name contains the other,
/// [MAJOR_NAME_PENALTY] when they are unrelated and [VERSION_PENALTY] for any
/// version difference. Names compare case-insensitively, versions exactly.
pub fn compute_verdict(
    app_name: &str,
    version_name: &str,
    listing: Option<&RemoteListing>
) -> VerdictResult {
    let mut score = STARTING_SCORE;
    let mut reasons = vec![];

    match listing {
        None => {
            score -= NOT_FOUND_PENALTY;
            reasons.push(Reason::NotOnStore);
        }
        Some(listing) => {
            let local_name = app_name.to_lowercase();
            let store_name = listing.title.to_lowercase();
            if local_name == store_name {
                reasons.push(Reason::NameMatch);
            } else if local_name.contains(&store_name) || store_name.contains(&local_name) {
                score -= MINOR_NAME_PENALTY;
                reasons.push(Reason::MinorNameMismatch {
                    local: app_name.to_string(),
                    store: listing.title.clone()
                });
            } else {
                score -= MAJOR_NAME_PENALTY;
                reasons.push(Reason::MajorNameMismatch {
                    local: app_name.to_string(),
                    store: listing.title.clone()
                });
            }

            if version_name == listing.version {
                reasons.push(Reason::VersionMatch {
                    version: version_name.to_string()
                });
            } else {
                score -= VERSION_PENALTY;
                reasons.push(Reason::VersionMismatch {
                    local: version_name.to_string(),
                    store: listing.version.clone()
                });
            }
            reasons.push(Reason::Developer {
                developer: listing.developer.clone()
            });
        }
    }

    VerdictResult {
        score,
        classification: Classification::from_score(score),
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, version: &str) -> RemoteListing {
        RemoteListing {
            title: title.into(),
            version: version.into(),
            developer: "D".into(),
            url: "https://play.google.com/store/apps/details?id=com.example".into()
        }
    }

    #[test]
    fn absent_listing_is_suspicious_with_one_reason() {
        let verdict = compute_verdict("Foo", "1.0", None);
        assert_eq!(verdict.score, 50);
        assert_eq!(verdict.classification, Classification::Suspicious);
        assert_eq!(verdict.reasons, vec![Reason::NotOnStore]);
    }

    #[test]
    fn full_match_is_genuine() {
        let verdict = compute_verdict("Foo", "1.0", Some(&listing("Foo", "1.0")));
        assert_eq!(verdict.score, 100);
        assert_eq!(verdict.classification, Classification::Genuine);
        assert_eq!(
            verdict.reasons,
            vec![
                Reason::NameMatch,
                Reason::VersionMatch {
                    version: "1.0".into()
                },
                Reason::Developer {
                    developer: "D".into()
                }
            ]
        );
    }

    #[test]
    fn substring_name_costs_fifteen() {
        let verdict = compute_verdict("Foo", "1.0", Some(&listing("Foobar", "1.0")));
        assert_eq!(verdict.score, 85);
        assert_eq!(verdict.classification, Classification::Suspicious);
        assert_eq!(
            verdict.reasons[0],
            Reason::MinorNameMismatch {
                local: "Foo".into(),
                store: "Foobar".into()
            }
        );
    }

    #[test]
    fn unrelated_name_and_version_is_likely_fake() {
        let verdict = compute_verdict("Foo", "1.0", Some(&listing("Zed", "2.0")));
        assert_eq!(verdict.score, 40);
        assert_eq!(verdict.classification, Classification::LikelyFake);
        assert_eq!(verdict.reasons.len(), 3);
        assert_eq!(verdict.reasons[1].severity(), Severity::Warning);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(Classification::from_score(90), Classification::Genuine);
        assert_eq!(Classification::from_score(89), Classification::Suspicious);
        assert_eq!(Classification::from_score(50), Classification::Suspicious);
        assert_eq!(Classification::from_score(49), Classification::LikelyFake);
        assert_eq!(Classification::from_score(-10), Classification::LikelyFake);
    }

    #[test]
    fn names_compare_case_insensitively() {
        let exact = compute_verdict("MyApp", "1.0", Some(&listing("myapp", "1.0")));
        assert_eq!(exact.score, 100);
        assert_eq!(exact.reasons[0], Reason::NameMatch);

        let lite = compute_verdict("MyApp", "1.0", Some(&listing("MyApp Lite", "1.0")));
        assert_eq!(lite.score, 85);

        // Unicode lowercasing, not just ASCII
        let accented = compute_verdict("\u{c9}COLE", "1.0", Some(&listing("\u{e9}cole", "1.0")));
        assert_eq!(accented.reasons[0], Reason::NameMatch);
    }

    #[test]
    fn versions_compare_as_plain_strings() {
        let verdict = compute_verdict("Foo", "1.0", Some(&listing("Foo", "1.0.0")));
        assert_eq!(verdict.score, 80);
        assert_eq!(
            verdict.reasons[1].to_string(),
            "Version Mismatch: APK version is 1.0, but the latest on the Play Store is 1.0.0. \
             This could be an old or modified version."
        );
    }

    #[test]
    fn tones_follow_classification() {
        assert_eq!(Classification::Genuine.tone(), Tone::Positive);
        assert_eq!(Classification::Suspicious.tone(), Tone::Cautionary);
        assert_eq!(Classification::LikelyFake.tone(), Tone::Negative);
        assert_eq!(Classification::LikelyFake.label(), "Potentially Fake or Unofficial");
    }
}
