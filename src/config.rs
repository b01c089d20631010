use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use url::Url;

use crate::cli::{AlbumsArgs, EvictArgs, FeedArgs, PortalArgs, StateArgs};
use crate::collab::CommandCollaborators;
use crate::portal::Endpoints;
use crate::retry::RetryConfig;
use crate::sync::NotifySettings;
use crate::types::PersistMode;

const STATE_FILE: &str = "state.json";
const MAX_RETRY_DELAY_SECS: u64 = 60;

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn state_path(args: &StateArgs) -> PathBuf {
    expand_tilde(&args.data_directory).join(STATE_FILE)
}

/// Resolve the portal root from `--base-url`, falling back to
/// `https://<subdomain>.schoology.com`.
fn resolve_base_url(base_url: Option<&str>, subdomain: Option<&str>) -> anyhow::Result<Url> {
    let raw = match (base_url, subdomain) {
        (Some(url), _) if !url.trim().is_empty() => url.trim().to_string(),
        (_, Some(sub)) if !sub.trim().is_empty() => {
            let sub = sub.trim();
            if !sub
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                anyhow::bail!("Invalid subdomain '{}'", sub);
            }
            return Ok(Endpoints::for_subdomain(sub)?.base().clone());
        }
        _ => anyhow::bail!("One of --base-url or --subdomain is required"),
    };
    let url = Url::parse(&raw).with_context(|| format!("Invalid portal URL '{}'", raw))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        anyhow::bail!("Portal URL must be http(s) with a host, got '{}'", raw);
    }
    Ok(url)
}

/// Where the state document lives.
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub state_path: PathBuf,
}

impl StateConfig {
    pub fn from_args(args: &StateArgs) -> Self {
        Self {
            state_path: state_path(args),
        }
    }
}

/// Settings shared by every command that talks to the portal.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: Url,
    pub session_file: PathBuf,
    pub state_path: PathBuf,
    pub root_id: Option<String>,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub watch_with_interval: Option<u64>,
}

impl PortalConfig {
    pub fn from_args(args: &PortalArgs) -> anyhow::Result<Self> {
        let base_url = resolve_base_url(args.base_url.as_deref(), args.subdomain.as_deref())?;
        if args.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }
        if let Some(id) = args.root_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            if !crate::state::is_plain_root_id(id) {
                anyhow::bail!("--root-id must be a plain course id, got '{}'", id);
            }
        }
        if args.watch_with_interval == Some(0) {
            anyhow::bail!("--watch-with-interval must be at least 1 second");
        }
        Ok(Self {
            base_url,
            session_file: expand_tilde(&args.session_file),
            state_path: state_path(&args.state),
            root_id: args
                .root_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            timeout: Duration::from_secs(args.timeout),
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                max_delay_secs: MAX_RETRY_DELAY_SECS.max(args.retry_delay),
            },
            watch_with_interval: args.watch_with_interval,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AlbumsConfig {
    pub portal: PortalConfig,
    pub media_root: PathBuf,
    pub touch: bool,
    pub max_pages: u32,
}

impl AlbumsConfig {
    pub fn from_args(args: &AlbumsArgs) -> anyhow::Result<Self> {
        if args.max_pages == 0 {
            anyhow::bail!("--max-pages must be at least 1");
        }
        Ok(Self {
            portal: PortalConfig::from_args(&args.portal)?,
            media_root: expand_tilde(&args.directory),
            touch: args.touch,
            max_pages: args.max_pages,
        })
    }
}

pub struct FeedConfig {
    pub portal: PortalConfig,
    pub notify: NotifySettings,
    pub collaborators: CommandCollaborators,
    pub attachments_dir: PathBuf,
    pub persist: PersistMode,
    pub dry_run: bool,
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = |cmd: &Option<String>| if cmd.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("FeedConfig")
            .field("portal", &self.portal)
            .field("notify", &self.notify)
            .field("summarize_cmd", &shown(&self.collaborators.summarize_cmd))
            .field("translate_cmd", &shown(&self.collaborators.translate_cmd))
            .field("deliver_cmd", &shown(&self.collaborators.deliver_cmd))
            .field("extract_text_cmd", &shown(&self.collaborators.extract_text_cmd))
            .field("persist", &self.persist)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FeedConfig {
    pub fn from_args(args: &FeedArgs) -> anyhow::Result<Self> {
        let portal = PortalConfig::from_args(&args.portal)?;
        let collaborators = CommandCollaborators {
            summarize_cmd: non_empty(&args.summarize_cmd),
            translate_cmd: non_empty(&args.translate_cmd),
            deliver_cmd: non_empty(&args.deliver_cmd),
            extract_text_cmd: non_empty(&args.extract_text_cmd),
        };
        let sender = non_empty(&args.sender);
        let translate_to: Vec<String> = args
            .translate_to
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        if !args.dry_run {
            if sender.is_none() {
                anyhow::bail!("--sender is required to deliver summaries");
            }
            if collaborators.summarize_cmd.is_none() {
                anyhow::bail!("--summarize-cmd is required to deliver summaries");
            }
            if collaborators.deliver_cmd.is_none() {
                anyhow::bail!("--deliver-cmd is required to deliver summaries");
            }
            if !translate_to.is_empty() && collaborators.translate_cmd.is_none() {
                anyhow::bail!("--translate-to needs --translate-cmd");
            }
        }

        Ok(Self {
            portal,
            notify: NotifySettings {
                sender: sender.unwrap_or_default(),
                bcc: args
                    .bcc
                    .iter()
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty())
                    .collect(),
                subject: args.subject.clone(),
                translate_to,
            },
            collaborators,
            attachments_dir: expand_tilde(&args.attachments_directory),
            persist: args.persist,
            dry_run: args.dry_run,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EvictConfig {
    pub state_path: PathBuf,
    pub collections: Vec<String>,
    pub records: Vec<String>,
}

impl EvictConfig {
    pub fn from_args(args: &EvictArgs) -> anyhow::Result<Self> {
        if args.collections.is_empty() && args.records.is_empty() {
            anyhow::bail!("Nothing to evict: pass --collection and/or --record");
        }
        Ok(Self {
            state_path: state_path(&args.state),
            collections: args.collections.clone(),
            records: args.records.clone(),
        })
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}
