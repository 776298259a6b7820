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

//! A Google Play client that implements [AppStore] by fetching the public
//! details and search pages.

pub mod scraper;

use std::time::Duration;

use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vet_common::*;
use vet_verdict::{AppStore, LookupError, RemoteListing, SearchCandidate, SearchError};

pub const DEFAULT_BASE_URL: &str = "https://play.google.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Scheme and host the store pages are fetched from.
    pub base_url: String,
    /// Language of the listing (`hl`).
    pub lang: String,
    /// Country of the listing (`gl`).
    pub country: String,
    pub timeout_secs: u64,
    pub user_agent: String
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            lang: "en".to_string(),
            country: "us".to_string(),
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string()
        }
    }
}

/// Google Play, read through its HTML pages. Each operation is a single
/// request bounded by the configured timeout.
pub struct PlayStore {
    config: StoreConfig,
    client: Client
}

impl PlayStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VetError::StoreRequestFailed(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fetches a store page. `Ok(None)` means the store answered 404.
    fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<String>> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        debug!("Fetching {url} {query:?}");
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("hl", self.config.lang.as_str()), ("gl", self.config.country.as_str())])
            .send()
            .map_err(|e| VetError::StoreRequestFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VetError::StoreRequestFailed(format!("{url} answered {status}")));
        }
        let body = response
            .text()
            .map_err(|e| VetError::StoreRequestFailed(e.to_string()))?;
        Ok(Some(body))
    }

    fn fetch_listing(&self, package_name: &str) -> Result<Option<RemoteListing>> {
        match self.fetch("/store/apps/details", &[("id", package_name)])? {
            Some(html) => scraper::parse_details(&html, package_name).map(Some),
            None => Ok(None)
        }
    }

    fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<SearchCandidate>> {
        match self.fetch("/store/search", &[("q", query), ("c", "apps")])? {
            Some(html) => scraper::parse_search(&html, limit),
            None => Ok(vec![])
        }
    }
}

impl AppStore for PlayStore {
    fn lookup(&self, package_name: &str) -> std::result::Result<RemoteListing, LookupError> {
        match self.fetch_listing(package_name) {
            Ok(Some(listing)) => Ok(listing),
            Ok(None) => Err(LookupError::NotFound),
            Err(e) => Err(LookupError::Failed(e.to_string()))
        }
    }

    fn search(&self, query: &str, limit: usize) -> std::result::Result<Vec<SearchCandidate>, SearchError> {
        self.fetch_search(query, limit)
            .map_err(|e| SearchError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread::{self, JoinHandle}
    };

    use super::*;
    use crate::scraper::tests::{details_page, search_page};

    // Answers a single request and hands back its request line
    fn serve_once(status: &'static str, body: String) -> (StoreConfig, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = StoreConfig {
            base_url: format!("http://{}", listener.local_addr().unwrap()),
            timeout_secs: 5,
            ..StoreConfig::default()
        };
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            request_line
        });
        (config, handle)
    }

    #[test]
    fn lookup_reads_listing() {
        let (config, server) = serve_once("200 OK", details_page("Notes", "Example Inc.", Some("2.1.0")));
        let store = PlayStore::new(config).unwrap();

        let listing = store.lookup("com.example.notes").unwrap();
        assert_eq!(listing.title, "Notes");
        assert_eq!(listing.version, "2.1.0");
        assert_eq!(listing.url, "https://play.google.com/store/apps/details?id=com.example.notes");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /store/apps/details?"));
        assert!(request.contains("id=com.example.notes"));
        assert!(request.contains("hl=en"));
        assert!(request.contains("gl=us"));
    }

    #[test]
    fn lookup_404_is_not_found() {
        let (config, server) = serve_once("404 Not Found", String::from("gone"));
        let store = PlayStore::new(config).unwrap();
        assert_eq!(store.lookup("com.example.missing"), Err(LookupError::NotFound));
        server.join().unwrap();
    }

    #[test]
    fn lookup_server_error_fails() {
        let (config, server) = serve_once("500 Internal Server Error", String::new());
        let store = PlayStore::new(config).unwrap();
        assert!(matches!(store.lookup("com.example.notes"), Err(LookupError::Failed(_))));
        server.join().unwrap();
    }

    #[test]
    fn lookup_unparseable_page_fails() {
        let (config, server) = serve_once("200 OK", String::from("<html>maintenance</html>"));
        let store = PlayStore::new(config).unwrap();
        let Err(LookupError::Failed(message)) = store.lookup("com.example.notes") else {
            panic!("expected a failed lookup");
        };
        assert!(message.contains("ds:5"));
        server.join().unwrap();
    }

    #[test]
    fn lookup_unreachable_store_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let store = PlayStore::new(StoreConfig {
            base_url,
            timeout_secs: 2,
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(matches!(store.lookup("com.example.notes"), Err(LookupError::Failed(_))));
    }

    #[test]
    fn search_reads_candidates() {
        let (config, server) = serve_once(
            "200 OK",
            search_page(None, &[("org.other.notes", "Notes Pro", "Other"), ("net.third.memo", "Memo", "Third")])
        );
        let store = PlayStore::new(config).unwrap();

        let found = store.search("Notes", 3).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].app_id, "org.other.notes");

        let request = server.join().unwrap();
        assert!(request.starts_with("GET /store/search?"));
        assert!(request.contains("q=Notes"));
        assert!(request.contains("c=apps"));
    }

    #[test]
    fn default_config_points_at_play() {
        let config = StoreConfig::default();
        assert_eq!(config.base_url, "https://play.google.com");
        assert_eq!((config.lang.as_str(), config.country.as_str()), ("en", "us"));
        assert_eq!(config.timeout_secs, 10);
    }
}
