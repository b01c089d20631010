use clap::{Args, Parser, Subcommand};

use crate::portal::discovery::DEFAULT_MAX_PAGES;
use crate::types::{LogLevel, PersistMode};

#[derive(Parser, Debug)]
#[command(
    name = "schoology-sync",
    version,
    about = "Mirror Schoology course albums and feed updates incrementally"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover course albums and download the ones not yet acquired
    Albums(AlbumsArgs),
    /// Extract the course feed and deliver summaries of new posts
    Feed(FeedArgs),
    /// Show what the state document records
    Status(StateArgs),
    /// Forget albums or posts so the next run processes them again
    Evict(EvictArgs),
}

/// Location of the state document.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Directory holding state.json and its lock file
    #[arg(long, default_value = "~/.schoology-sync")]
    pub data_directory: String,
}

/// How to reach the portal.
#[derive(Args, Debug, Clone)]
pub struct PortalArgs {
    /// School subdomain, as in <subdomain>.schoology.com
    #[arg(long, env = "PORTAL_SUBDOMAIN")]
    pub subdomain: Option<String>,

    /// Full portal URL; overrides --subdomain
    #[arg(long, env = "PORTAL_BASE_URL")]
    pub base_url: Option<String>,

    /// Cookies exported by the login flow (JSON)
    #[arg(long, default_value = "~/.schoology-sync/session.json")]
    pub session_file: String,

    /// Course id; only used when the state document has none yet
    #[arg(long, env = "PORTAL_ROOT_ID")]
    pub root_id: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Retries for transient HTTP failures
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds between retries
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Run continuously, waiting N seconds between runs
    #[arg(long)]
    pub watch_with_interval: Option<u64>,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AlbumsArgs {
    #[command(flatten)]
    pub portal: PortalArgs,

    /// Media root; albums land in <directory>/<course id>/<title>
    #[arg(short = 'd', long, default_value = "photos")]
    pub directory: String,

    /// Record albums as acquired without downloading (backfill)
    #[arg(long)]
    pub touch: bool,

    /// Give up on a listing that still has entries after this many pages
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,
}

#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub portal: PortalArgs,

    /// Sender and recipient of summary messages
    #[arg(long, env = "SUMMARY_SENDER_EMAIL")]
    pub sender: Option<String>,

    /// Blind-copy recipients, comma separated
    #[arg(long, env = "BCC_EMAILS", value_delimiter = ',')]
    pub bcc: Vec<String>,

    /// Message subject
    #[arg(long, default_value = crate::sync::notify::DEFAULT_SUBJECT)]
    pub subject: String,

    /// Translate the summary into this language (repeatable)
    #[arg(long = "translate-to")]
    pub translate_to: Vec<String>,

    /// Command that reads text on stdin and prints a summary
    #[arg(long, env = "SUMMARIZE_CMD")]
    pub summarize_cmd: Option<String>,

    /// Command that translates stdin into $TARGET_LANGUAGE
    #[arg(long, env = "TRANSLATE_CMD")]
    pub translate_cmd: Option<String>,

    /// Command that delivers the JSON message envelope read from stdin
    #[arg(long, env = "DELIVER_CMD")]
    pub deliver_cmd: Option<String>,

    /// Command that prints the text of the document at $FILE_PATH
    #[arg(long, env = "EXTRACT_TEXT_CMD")]
    pub extract_text_cmd: Option<String>,

    /// When to write the state document
    #[arg(long, value_enum, default_value = "record")]
    pub persist: PersistMode,

    /// Log what would be delivered without delivering or saving state
    #[arg(long)]
    pub dry_run: bool,

    /// Where post attachments are stored
    #[arg(long, default_value = "attachments")]
    pub attachments_directory: String,
}

#[derive(Args, Debug, Clone)]
pub struct EvictArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Album key to forget, e.g. /album/123 (repeatable)
    #[arg(long = "collection")]
    pub collections: Vec<String>,

    /// Post key to forget (repeatable)
    #[arg(long = "record")]
    pub records: Vec<String>,
}
