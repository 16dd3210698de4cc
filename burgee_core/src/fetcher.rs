//! An HTTP client that fetches the flag set from a server.
use async_trait::async_trait;
use reqwest::Url;

use crate::export::SnapshotExport;
use crate::models::{Flag, TryParse};
use crate::snapshot_source::SnapshotSource;
use crate::{Error, Result};

/// Endpoint serving the snapshot export document.
const EXPORT_ENDPOINT: &str = "/export/eval_cache/json";

/// Older servers don't serve the export document; they list flags as a bare JSON array here.
const LISTING_ENDPOINT: &str = "/flags";

/// A client that fetches the full flag set from a server.
///
/// The primary source is the snapshot export endpoint. If it fails for any reason (network,
/// status, undecodable body), the fetcher falls back to the flag-listing endpoint, so the SDK
/// keeps working against servers that predate the export.
#[derive(Debug)]
pub struct SnapshotFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    export_url: Url,
    listing_url: Url,
}

impl SnapshotFetcher {
    /// Create a fetcher for the API rooted at `base_url` (e.g. `https://host/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBaseUrl`] if `base_url` does not parse as an absolute URL.
    pub fn new(base_url: &str) -> Result<SnapshotFetcher> {
        SnapshotFetcher::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a fetcher using a preconfigured `client` (timeouts, proxies, TLS).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<SnapshotFetcher> {
        let base = base_url.trim_end_matches('/');

        let export_url =
            Url::parse(&format!("{base}{EXPORT_ENDPOINT}")).map_err(Error::InvalidBaseUrl)?;
        let listing_url =
            Url::parse_with_params(&format!("{base}{LISTING_ENDPOINT}"), &[("preload", "true")])
                .map_err(Error::InvalidBaseUrl)?;

        Ok(SnapshotFetcher {
            client,
            export_url,
            listing_url,
        })
    }

    async fn fetch_export(&self) -> Result<Vec<Flag>> {
        log::debug!(target: "burgee", "fetching snapshot export");
        let response = self.client.get(self.export_url.clone()).send().await?;
        let response = check_status(response)?;
        let export: SnapshotExport = response.json().await?;

        log::debug!(target: "burgee", "successfully fetched snapshot export");
        Ok(export.into_flags())
    }

    async fn fetch_listing(&self) -> Result<Vec<Flag>> {
        log::debug!(target: "burgee", "fetching flag listing");
        let response = self.client.get(self.listing_url.clone()).send().await?;
        let response = check_status(response)?;
        let entries: Vec<TryParse<Flag>> = response.json().await?;

        let mut flags = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                TryParse::Parsed(flag) => flags.push(flag),
                TryParse::ParseFailed(raw) => {
                    log::warn!(target: "burgee", "skipping unparsable flag entry: {raw}");
                }
            }
        }

        log::debug!(target: "burgee", "successfully fetched flag listing");
        Ok(flags)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        log::warn!(target: "burgee", "received non-success response while fetching flags: {status}");
        Err(Error::UnexpectedResponse { status })
    }
}

#[async_trait]
impl SnapshotSource for SnapshotFetcher {
    async fn fetch_flags(&self) -> Result<Vec<Flag>> {
        match self.fetch_export().await {
            Ok(flags) => Ok(flags),
            Err(err) => {
                log::warn!(target: "burgee",
                    "export endpoint failed, falling back to flag listing: {err}");
                self.fetch_listing().await
            }
        }
    }
}
