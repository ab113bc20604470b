//! Command-line arguments and the validated run configuration.

use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use nonzero_ext::nonzero;
use url::Url;

use crate::layers::download::RetrySettings;

pub const DEFAULT_API_URL: &str = "https://api.semanticscholar.org/graph/v1";
pub const DEFAULT_PDF_BASE_URL: &str = "https://aclanthology.org";

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Semantic Scholar asks anonymous callers to stay around 1 request per second.
fn default_rate(has_api_key: bool) -> NonZeroU32 {
    if has_api_key {
        nonzero!(10u32)
    } else {
        nonzero!(1u32)
    }
}

/// Where paper metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Paginated Semantic Scholar search filtered to the venue.
    PaginatedApi,
    /// A single JSON dump of the anthology, sampled by seed.
    BulkDump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Venue {
    AclAnthology,
}

impl Venue {
    /// Key of this venue inside Semantic Scholar's `externalIds`.
    pub const fn external_id_key(self) -> &'static str {
        match self {
            Self::AclAnthology => "ACL",
        }
    }

    /// Identifier prefixes of the venue's main proceedings in the anthology.
    pub fn default_id_prefixes(self) -> Vec<String> {
        match self {
            Self::AclAnthology => [
                "P", "2020.acl-", "2021.acl-", "2022.acl-", "2023.acl-", "2024.acl-", "2025.acl-",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AclAnthology => f.write_str("ACL Anthology"),
        }
    }
}

/// How downloaded PDFs are named on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileNaming {
    Identifier,
    Title,
}

#[derive(Parser, Debug)]
#[command(name = "acl-fetch", version, about = "Find ACL Anthology papers and download their PDFs")]
pub struct Args {
    /// Metadata source to use
    #[arg(long, value_enum, default_value_t = Mode::PaginatedApi)]
    pub mode: Mode,

    /// Search query term, e.g. "natural language processing" (paginated-api mode)
    #[arg(short, long)]
    pub query: Option<String>,

    /// Publication venue to filter papers from
    #[arg(long, value_enum, default_value_t = Venue::AclAnthology)]
    pub venue: Venue,

    /// Number of papers to retrieve
    #[arg(short = 'n', long, default_value_t = 10)]
    pub num_papers: usize,

    /// Directory to save downloaded PDFs
    #[arg(short, long, default_value = "acl_papers")]
    pub output_dir: PathBuf,

    /// Semantic Scholar API key
    #[arg(long, env = "SEMANTIC_SCHOLAR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Attempts per PDF before giving up
    #[arg(long, default_value_t = 3)]
    pub retry_attempts: u32,

    /// Shortest wait between download attempts; grows exponentially up to 5 s
    #[arg(long, default_value_t = 100)]
    pub retry_delay_ms: u64,

    /// Seed for sampling papers out of the bulk dump
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Semantic Scholar Graph API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// URL of the anthology JSON dump (bulk-dump mode)
    #[arg(long, env = "ACL_DUMP_URL")]
    pub dump_url: Option<String>,

    /// Base URL that serves `<id>.pdf` for anthology papers
    #[arg(long, default_value = DEFAULT_PDF_BASE_URL)]
    pub pdf_base_url: String,

    /// Identifier prefix to accept from the dump (repeatable, overrides venue defaults)
    #[arg(long = "id-prefix")]
    pub id_prefixes: Vec<String>,

    /// Name PDFs by identifier or by sanitized title
    #[arg(long, value_enum)]
    pub name_by: Option<FileNaming>,

    /// Metadata API request rate
    #[arg(long)]
    pub requests_per_second: Option<NonZeroU32>,
}

/// Validated settings for one run.
#[derive(Clone)]
pub struct Config {
    pub mode: Mode,
    pub query: Option<String>,
    pub venue: Venue,
    pub num_papers: usize,
    pub output_dir: PathBuf,
    pub api_key: Option<String>,
    pub retry: RetrySettings,
    pub seed: u64,
    pub api_url: Url,
    pub dump_url: Option<Url>,
    pub pdf_base_url: Url,
    pub id_prefixes: Vec<String>,
    pub file_naming: FileNaming,
    pub requests_per_second: NonZeroU32,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.num_papers == 0 {
            bail!("--num-papers must be greater than 0");
        }
        if args.retry_attempts == 0 {
            bail!("--retry-attempts must be greater than 0");
        }

        let query = args
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let dump_url = args
            .dump_url
            .as_deref()
            .map(|u| parse_url("--dump-url", u))
            .transpose()?;

        match args.mode {
            Mode::PaginatedApi if query.is_none() => {
                bail!("--query is required in paginated-api mode")
            }
            Mode::BulkDump if dump_url.is_none() => {
                bail!("--dump-url (or ACL_DUMP_URL) is required in bulk-dump mode")
            }
            _ => {}
        }

        let api_key = args.api_key.filter(|k| !k.trim().is_empty());
        let requests_per_second = args
            .requests_per_second
            .unwrap_or_else(|| default_rate(api_key.is_some()));

        let id_prefixes = if args.id_prefixes.is_empty() {
            args.venue.default_id_prefixes()
        } else {
            args.id_prefixes
        };

        let file_naming = args.name_by.unwrap_or(match args.mode {
            Mode::PaginatedApi => FileNaming::Identifier,
            Mode::BulkDump => FileNaming::Title,
        });

        Ok(Self {
            mode: args.mode,
            query,
            venue: args.venue,
            num_papers: args.num_papers,
            output_dir: args.output_dir,
            api_key,
            retry: RetrySettings {
                attempts: args.retry_attempts,
                min_delay: Duration::from_millis(args.retry_delay_ms),
                max_delay: MAX_RETRY_DELAY,
            },
            seed: args.seed,
            api_url: parse_url("--api-url", &args.api_url)?,
            dump_url,
            pdf_base_url: parse_url("--pdf-base-url", &args.pdf_base_url)?,
            id_prefixes,
            file_naming,
            requests_per_second,
        })
    }

    /// The base URL PDFs are built from when a record has no direct link.
    ///
    /// Only anthology dump records are addressable this way; search results
    /// without an open-access link stay unresolved.
    pub fn constructed_pdf_base(&self) -> Option<&Url> {
        match self.mode {
            Mode::PaginatedApi => None,
            Mode::BulkDump => Some(&self.pdf_base_url),
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        Self::from_args(args)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("query", &self.query)
            .field("venue", &self.venue)
            .field("num_papers", &self.num_papers)
            .field("output_dir", &self.output_dir)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .field("seed", &self.seed)
            .field("api_url", &self.api_url.as_str())
            .field("dump_url", &self.dump_url.as_ref().map(Url::as_str))
            .field("pdf_base_url", &self.pdf_base_url.as_str())
            .field("id_prefixes", &self.id_prefixes)
            .field("file_naming", &self.file_naming)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

fn parse_url(flag: &str, value: &str) -> Result<Url> {
    Url::parse(value).with_context(|| format!("{flag} is not a valid URL: {value}"))
}
