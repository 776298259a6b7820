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

//! Plain text renderings of inspections and verification reports, for
//! terminals and logs.

use std::fmt::{self, Display, Formatter};

use vet_verdict::{details_url, ComparisonOutcome, Tone, VerdictResult};

use crate::{ApkDetails, ApkInspection, CertificateReport, VerificationReport};

pub const NO_SIMILAR_APPS: &str = "No similar apps found on the Play Store.";

fn banner(tone: Tone) -> &'static str {
    match tone {
        Tone::Positive => "[OK]",
        Tone::Cautionary => "[WARN]",
        Tone::Negative => "[FAIL]"
    }
}

fn write_verdict(f: &mut Formatter<'_>, verdict: &VerdictResult) -> fmt::Result {
    let classification = verdict.classification;
    writeln!(
        f,
        "{} {} (score {})",
        banner(classification.tone()),
        classification.label(),
        verdict.score
    )?;
    writeln!(f)?;
    writeln!(f, "Analysis:")?;
    for reason in &verdict.reasons {
        writeln!(f, "  {} {reason}", reason.severity().marker())?;
    }
    Ok(())
}

fn write_outcome(f: &mut Formatter<'_>, outcome: &ComparisonOutcome) -> fmt::Result {
    match outcome {
        ComparisonOutcome::DirectComparison { verdict, local, listing } => {
            write_verdict(f, verdict)?;
            writeln!(f)?;
            writeln!(f, "Detailed Comparison:")?;
            writeln!(f, "  Uploaded APK")?;
            writeln!(f, "    App Name: {}", local.app_name)?;
            writeln!(f, "    Version:  {}", local.version_name)?;
            writeln!(f, "  Play Store Listing")?;
            writeln!(f, "    App Name: {}", listing.title)?;
            writeln!(f, "    Version:  {}", listing.version)?;
            writeln!(f, "    Developer: {}", listing.developer)?;
            writeln!(f, "  View on Google Play Store: {}", listing.url)
        }
        ComparisonOutcome::FallbackSearch { verdict, query, candidates } => {
            write_verdict(f, verdict)?;
            writeln!(f)?;
            writeln!(f, "Searching for Apps Named '{query}'...")?;
            if candidates.is_empty() {
                return writeln!(f, "  {NO_SIMILAR_APPS}");
            }
            writeln!(f, "  Here are the top legitimate apps with a similar name:")?;
            for candidate in candidates {
                writeln!(f, "  - {} by {}", candidate.title, candidate.developer)?;
                writeln!(f, "    Package: {}", candidate.app_id)?;
                writeln!(f, "    {}", details_url(&candidate.app_id))?;
            }
            Ok(())
        }
        ComparisonOutcome::FallbackSearchFailed { verdict, query, message } => {
            write_verdict(f, verdict)?;
            writeln!(f)?;
            writeln!(f, "Searching for Apps Named '{query}'...")?;
            writeln!(f, "  An error occurred during the search: {message}")
        }
        ComparisonOutcome::OrchestratorError { message } => writeln!(
            f,
            "{} An unexpected error occurred while contacting the Play Store: {message}",
            banner(Tone::Negative)
        )
    }
}

fn write_certificates(f: &mut Formatter<'_>, certificates: &CertificateReport) -> fmt::Result {
    writeln!(f, "Signing Certificates:")?;
    match certificates {
        CertificateReport::Found(certificates) => {
            for certificate in certificates {
                writeln!(f, "  {}", certificate.scheme)?;
                writeln!(f, "    Subject: {}", certificate.subject)?;
                writeln!(f, "    Issuer:  {}", certificate.issuer)?;
                writeln!(f, "    SHA-256: {}", certificate.sha256_fingerprint)?;
                if certificate.is_self_signed() {
                    writeln!(f, "    (self-signed)")?;
                }
            }
            Ok(())
        }
        CertificateReport::Unavailable(reason) => writeln!(f, "  Unavailable: {reason}")
    }
}

fn write_details(f: &mut Formatter<'_>, details: &ApkDetails) -> fmt::Result {
    let unknown = "(unknown)";
    writeln!(f, "Package:     {}", details.package_name.as_deref().unwrap_or(unknown))?;
    writeln!(f, "App Name:    {}", details.app_name().unwrap_or(unknown))?;
    match details.version_code {
        Some(code) => writeln!(
            f,
            "Version:     {} (code {code})",
            details.version_name.as_deref().unwrap_or(unknown)
        )?,
        None => writeln!(f, "Version:     {}", details.version_name.as_deref().unwrap_or(unknown))?
    }
    if let Some(min) = &details.min_sdk_version {
        writeln!(f, "Min SDK:     {min}")?;
    }
    if let Some(target) = &details.target_sdk_version {
        writeln!(f, "Target SDK:  {target}")?;
    }
    if details.labels.len() > 1 {
        writeln!(f, "Labels:")?;
        for (locale, label) in &details.labels {
            let locale = if locale.is_empty() { "(default)" } else { locale };
            writeln!(f, "  {locale}: {label}")?;
        }
    }
    if !details.permissions.is_empty() {
        writeln!(f, "Permissions:")?;
        for permission in &details.permissions {
            writeln!(f, "  {permission}")?;
        }
    }
    Ok(())
}

struct VerificationText<'a>(&'a VerificationReport);

impl Display for VerificationText<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(
            f,
            "APK: {} ({}) version {}",
            report.local.app_name, report.local.package_name, report.local.version_name
        )?;
        writeln!(f)?;
        write_outcome(f, &report.outcome)?;
        writeln!(f)?;
        write_certificates(f, &report.certificates)
    }
}

struct InspectionText<'a>(&'a ApkInspection);

impl Display for InspectionText<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_details(f, &self.0.details)?;
        writeln!(f)?;
        write_certificates(f, &self.0.certificates)
    }
}

pub fn render_text(report: &VerificationReport) -> String {
    VerificationText(report).to_string()
}

pub fn render_inspection_text(inspection: &ApkInspection) -> String {
    InspectionText(inspection).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inspect_apk, tests::{signed_notes_apk, FakeStore}, verify_apk, LookupError, SearchCandidate,
        SearchError
    };

    #[test]
    fn genuine_report() {
        let store = FakeStore::listing("Notes", "2.1.0", "Example Inc.");
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());

        assert!(text.starts_with("APK: Notes (com.example.notes) version 2.1.0"));
        assert!(text.contains("[OK] Likely Genuine (score 100)"));
        assert!(text.contains("  [ok] App Name Match"));
        assert!(text.contains("Developer: Example Inc."));
        assert!(text.contains("View on Google Play Store: https://play.google.com/store/apps/details?id=com.example.notes"));
        assert!(text.contains("CN=Example Release"));
    }

    #[test]
    fn mismatched_report_keeps_reason_order() {
        let store = FakeStore::listing("Notes Pro", "3.0", "Example Inc.");
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());

        assert!(text.contains("[WARN] Potentially Outdated or Modified (score 65)"));
        let minor = text.find("[!] Minor Name Mismatch").unwrap();
        let version = text.find("[!] Version Mismatch").unwrap();
        let developer = text.find("[ok] Official Developer").unwrap();
        assert!(minor < version && version < developer);
    }

    #[test]
    fn empty_search_report() {
        let store = FakeStore::missing(Ok(vec![]));
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());
        assert!(text.contains("[WARN] Potentially Outdated or Modified (score 50)"));
        assert!(text.contains("[x] App Not Found on Play Store"));
        assert!(text.contains(NO_SIMILAR_APPS));
    }

    #[test]
    fn search_candidates_listed() {
        let store = FakeStore::missing(Ok(vec![SearchCandidate {
            title: "Notes Pro".into(),
            developer: "Other".into(),
            app_id: "org.other.notes".into()
        }]));
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());
        assert!(text.contains("  - Notes Pro by Other"));
        assert!(text.contains("    Package: org.other.notes"));
        assert!(text.contains("    https://play.google.com/store/apps/details?id=org.other.notes"));
        assert!(!text.contains(NO_SIMILAR_APPS));
    }

    #[test]
    fn search_failure_reported() {
        let store = FakeStore::missing(Err(SearchError("rate limited".into())));
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());
        assert!(text.contains("An error occurred during the search: rate limited"));
    }

    #[test]
    fn lookup_failure_has_no_verdict() {
        let store = FakeStore {
            lookup: Err(LookupError::Failed("timed out".into())),
            ..FakeStore::missing(Ok(vec![]))
        };
        let text = render_text(&verify_apk(&signed_notes_apk(), &store).unwrap());
        assert!(text.contains("[FAIL] An unexpected error occurred while contacting the Play Store: timed out"));
        assert!(!text.contains("Analysis:"));
    }

    #[test]
    fn inspection_text() {
        let text = render_inspection_text(&inspect_apk(&signed_notes_apk()).unwrap());
        assert!(text.contains("Package:     com.example.notes"));
        assert!(text.contains("Version:     2.1.0 (code 1)"));
        assert!(text.contains("Signing Certificates:"));
        assert!(text.contains("v3 (APK Signature Scheme v3)"));
    }
}
