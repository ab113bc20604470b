use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::{Config, Mode, Venue};
use crate::error::FetchError;
use crate::layers::selection::{select_papers, DumpEntry};
use crate::layers::{FetchResult, PaperRecord};

/// Records returned per search page.
pub const PAGE_SIZE: usize = 100;
const SEARCH_FIELDS: &str = "paperId,title,externalIds,openAccessPdf";

#[derive(Deserialize)]
struct SSPage {
    #[serde(default)]
    data: Vec<SSPaper>,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SSPaper {
    paper_id: Option<String>,
    title: Option<String>,
    external_ids: Option<HashMap<String, serde_json::Value>>,
    open_access_pdf: Option<SSOpenAccessPdf>,
}

#[derive(Deserialize)]
struct SSOpenAccessPdf {
    url: Option<String>,
}

impl SSPaper {
    /// The paper's identifier in the venue's namespace, if it has one.
    fn venue_id(&self, venue: Venue) -> Option<String> {
        let value = self.external_ids.as_ref()?.get(venue.external_id_key())?;
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn into_record(self, id: String) -> PaperRecord {
        PaperRecord {
            id,
            title: self.title,
            paper_id: self.paper_id,
            pdf_url: self
                .open_access_pdf
                .and_then(|pdf| pdf.url)
                .filter(|u| !u.is_empty()),
            citations: None,
        }
    }
}

pub struct SemanticScholarClient {
    client: Client,
    api_key: Option<String>,
    search_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl SemanticScholarClient {
    pub fn new(api_url: &Url, api_key: Option<String>, rate: NonZeroU32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            search_url: format!("{}/paper/search", api_url.as_str().trim_end_matches('/')),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Pages through search results for `query`, keeping only papers that
    /// carry an identifier in the venue's namespace.
    ///
    /// Stops at `max_results` venue papers or when the API stops handing out
    /// continuation tokens. A failed page ends pagination; whatever was
    /// collected before it is returned.
    pub async fn fetch_venue_papers(&self, query: &str, venue: Venue, max_results: usize) -> FetchResult {
        let mut papers = FetchResult::new();
        let mut total_fetched = 0;
        let mut token: Option<String> = None;

        while total_fetched < max_results {
            let page = match self.search_page(query, token.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!("Paper search failed, keeping {} papers found so far: {}", papers.len(), e);
                    break;
                }
            };

            for paper in page.data {
                let Some(venue_id) = paper.venue_id(venue) else {
                    tracing::debug!("Skipping {:?}: no {} identifier", paper.title, venue.external_id_key());
                    continue;
                };
                let record = paper.into_record(venue_id);
                tracing::debug!("Found {} (paperId {:?})", record.id, record.paper_id);
                papers.insert(record);
                total_fetched += 1;
                if total_fetched >= max_results {
                    break;
                }
            }

            match page.token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        tracing::info!(
            "Retrieved {} {} papers ({} with an open-access PDF).",
            papers.len(),
            venue,
            papers.with_pdf_count()
        );
        papers
    }

    async fn search_page(&self, query: &str, token: Option<&str>) -> Result<SSPage, FetchError> {
        self.limiter.until_ready().await;

        let mut url = format!(
            "{}?query={}&fields={}&limit={}",
            self.search_url,
            urlencoding::encode(query),
            SEARCH_FIELDS,
            PAGE_SIZE
        );
        if let Some(token) = token {
            url.push_str("&token=");
            url.push_str(&urlencoding::encode(token));
        }

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        tracing::debug!("Querying Semantic Scholar: {}", url);
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status { status: resp.status(), url });
        }
        Ok(resp.json().await?)
    }
}

/// Client for a single JSON document mapping anthology id to paper metadata.
pub struct AnthologyDumpClient {
    client: Client,
    dump_url: Url,
}

impl AnthologyDumpClient {
    pub fn new(dump_url: Url) -> Self {
        Self {
            client: Client::new(),
            dump_url,
        }
    }

    pub async fn fetch_dump(&self) -> Result<BTreeMap<String, DumpEntry>, FetchError> {
        tracing::debug!("Downloading anthology dump: {}", self.dump_url);
        let resp = self.client.get(self.dump_url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status(),
                url: self.dump_url.to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    /// Downloads the dump and samples up to `count` venue papers from it.
    /// A failed download yields an empty result.
    pub async fn fetch_venue_papers(&self, prefixes: &[String], seed: u64, count: usize) -> FetchResult {
        match self.fetch_dump().await {
            Ok(dump) => {
                let total = dump.len();
                let papers = select_papers(dump, prefixes, seed, count);
                tracing::info!("Selected {} of {} dump entries (seed {}).", papers.len(), total, seed);
                papers
            }
            Err(e) => {
                tracing::error!("Anthology dump download failed: {}", e);
                FetchResult::new()
            }
        }
    }
}

/// Runs whichever metadata source the configuration selects.
pub async fn fetch_papers(config: &Config) -> FetchResult {
    match config.mode {
        Mode::PaginatedApi => {
            let client = SemanticScholarClient::new(
                &config.api_url,
                config.api_key.clone(),
                config.requests_per_second,
            );
            let query = config.query.as_deref().unwrap_or_default();
            client.fetch_venue_papers(query, config.venue, config.num_papers).await
        }
        Mode::BulkDump => match &config.dump_url {
            Some(dump_url) => {
                AnthologyDumpClient::new(dump_url.clone())
                    .fetch_venue_papers(&config.id_prefixes, config.seed, config.num_papers)
                    .await
            }
            None => {
                tracing::error!("No dump URL configured for bulk-dump mode");
                FetchResult::new()
            }
        },
    }
}
