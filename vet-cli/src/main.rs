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

use std::{fs, path::Path, path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use vet_api::{inspect_apk, render_xml, report, verify_apk, Result, VetError};
use vet_store::{PlayStore, StoreConfig};

/// Checks whether an APK is the app Google Play distributes under its package
/// name.
///
/// ```ignore
/// $ vet inspect ./notes.apk
/// Package:     com.example.notes
/// ...
/// $ vet verify ./notes.apk --country gb
/// APK: Notes (com.example.notes) version 2.1.0
///
/// [OK] Likely Genuine (score 100)
/// ...
/// ```
#[derive(Parser)]
#[command(name = "vet")]
#[command(about = "Checks APKs against their Google Play listing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool
}

#[derive(Subcommand)]
enum Commands {
    /// Show what an APK says about itself, without going online
    Inspect {
        /// Path to the APK
        apk: PathBuf,

        /// Also print the decoded AndroidManifest.xml
        #[arg(long)]
        raw: bool
    },

    /// Compare an APK with its Google Play listing
    Verify {
        /// Path to the APK
        apk: PathBuf,

        #[command(flatten)]
        store: StoreArgs
    }
}

/// Overrides for [StoreConfig]. Anything left out keeps its default.
#[derive(Args)]
struct StoreArgs {
    /// Listing language
    #[arg(long, env = "VET_STORE_LANG")]
    lang: Option<String>,

    /// Listing country
    #[arg(long, env = "VET_STORE_COUNTRY")]
    country: Option<String>,

    /// Seconds to wait for each store request
    #[arg(long, env = "VET_STORE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Store to query instead of https://play.google.com
    #[arg(long, env = "VET_STORE_URL")]
    store_url: Option<String>
}

impl StoreArgs {
    fn into_config(self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            base_url: self.store_url.unwrap_or(defaults.base_url),
            lang: self.lang.unwrap_or(defaults.lang),
            country: self.country.unwrap_or(defaults.country),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            user_agent: defaults.user_agent
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Could not set up logging: {e}");
    }

    let result = match cli.command {
        Commands::Inspect { apk, raw } => cmd_inspect(&apk, raw, cli.json),
        Commands::Verify { apk, store } => cmd_verify(&apk, store.into_config(), cli.json)
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn read_apk(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| VetError::Cli(format!("Could not read {}: {e}", path.display())))
}

fn cmd_inspect(path: &Path, raw: bool, as_json: bool) -> Result<()> {
    let inspection = inspect_apk(&read_apk(path)?)?;

    if as_json {
        let output = if raw {
            serde_json::to_string_pretty(&inspection)?
        } else {
            serde_json::to_string_pretty(&json!({
                "details": inspection.details,
                "certificates": inspection.certificates
            }))?
        };
        println!("{output}");
        return Ok(());
    }

    print!("{}", report::render_inspection_text(&inspection));
    if raw {
        println!();
        println!("AndroidManifest.xml:");
        println!("{}", render_xml(&inspection.manifest)?);
    }
    Ok(())
}

fn cmd_verify(path: &Path, config: StoreConfig, as_json: bool) -> Result<()> {
    let apk = read_apk(path)?;
    let store = PlayStore::new(config)?;
    let report = verify_apk(&apk, &store)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::render_text(&report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_args_fall_back_to_defaults() {
        let cli = Cli::try_parse_from(["vet", "verify", "app.apk", "--country", "gb"]).unwrap();
        let Commands::Verify { store, .. } = cli.command else {
            panic!("expected verify");
        };
        let config = store.into_config();
        assert_eq!(config.country, "gb");
        assert_eq!(config.base_url, "https://play.google.com");
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vet", "inspect", "app.apk", "--raw", "--json", "-v"]).unwrap();
        assert!(cli.json && cli.verbose);
        assert!(matches!(cli.command, Commands::Inspect { raw: true, .. }));
    }
}
