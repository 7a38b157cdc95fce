//! CLI entry point for the Xiaohongshu crawler.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::{TryStreamExt, future};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use xhs_core::api::{ClientOptions, LookupError, SearchRequest, UrlBatchReport, XhsClient};
use xhs_core::client::{ApiError, PipelineConfig, RequestPipeline, RetryPolicy};
use xhs_core::input::{NoteLocator, parse_note_ref, parse_user_ref};
use xhs_core::proxy::{DEFAULT_PROBE_URL, ProxyPool, redact, test_proxy};
use xhs_core::session::{
    CredentialSet, DEFAULT_SESSION_TTL, EncryptedFileStore, Session, SessionCache, SessionRecord,
};
use xhs_core::sign::{ExclusiveOracle, HttpSigningOracle, SignatureEnvelopeBuilder};

mod app_config;
mod cli;

use app_config::{FileConfig, load_default_file_config};
use cli::{Args, BatchCommand, Command, ProxyCommand, SessionCommand};

/// Signing service address when neither flag nor config names one.
const DEFAULT_SIGNER_URL: &str = "http://127.0.0.1:5005";

/// Timeout for calls to the signing service.
const SIGNER_TIMEOUT: Duration = Duration::from_secs(30);

const REAUTH_HINT: &str = "Run `xhs-crawler session set` with fresh browser cookies.";

/// Process outcome mapped to an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Failure,
    Partial,
    AuthRequired,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::AuthRequired => ExitCode::from(3),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(exit) => exit.into(),
        Err(err) if requires_reauth(&err) => {
            eprintln!("Error: {err:#}");
            eprintln!("{REAUTH_HINT}");
            ProcessExit::AuthRequired.into()
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ProcessExit::Failure.into()
        }
    }
}

/// Priority: `RUST_LOG` > `-q` > `-v` count > `info`.
fn init_tracing(args: &Args) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn requires_reauth(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .or_else(|| match cause.downcast_ref::<LookupError>() {
                Some(LookupError::Api(api)) => Some(api),
                _ => None,
            })
            .is_some_and(|api| api.kind().needs_reauth())
    })
}

async fn run(args: Args) -> Result<ProcessExit> {
    let loaded = load_default_file_config()?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "config file loaded");
    }
    let config = loaded.config;

    match &args.command {
        Command::Session(action) => return run_session_command(&args, &config, action),
        Command::Proxy(ProxyCommand::Test {
            proxies,
            probe_url,
            timeout_secs,
        }) => {
            let proxies = if proxies.is_empty() {
                merged_proxies(&args, &config)
            } else {
                proxies.clone()
            };
            let probe_url = probe_url
                .clone()
                .or_else(|| config.proxy_probe_url.clone())
                .unwrap_or_else(|| DEFAULT_PROBE_URL.to_string());
            return run_proxy_test(&proxies, &probe_url, Duration::from_secs(*timeout_secs)).await;
        }
        _ => {}
    }

    let runtime = Runtime::build(&args, &config)?;
    let outcome = runtime.dispatch(&args.command).await;
    match &outcome {
        Err(err) if requires_reauth(err) => runtime.discard_session(),
        Ok(ProcessExit::AuthRequired) => {
            runtime.discard_session();
            eprintln!("{REAUTH_HINT}");
        }
        _ => runtime.persist_rotated_cookies(),
    }
    outcome
}

fn session_file(args: &Args, config: &FileConfig) -> Option<PathBuf> {
    args.session_file
        .clone()
        .or_else(|| config.session_file.clone())
}

fn open_cache(path: Option<PathBuf>) -> Result<SessionCache> {
    let store = EncryptedFileStore::open(path).context("Failed to open session store")?;
    Ok(SessionCache::new(Arc::new(store)))
}

fn merged_proxies(args: &Args, config: &FileConfig) -> Vec<String> {
    if args.proxies.is_empty() {
        config.proxies.clone()
    } else {
        args.proxies.clone()
    }
}

/// Everything a data command needs.
struct Runtime {
    client: XhsClient,
    session: Arc<Session>,
    cache: SessionCache,
    loaded: Option<SessionRecord>,
}

impl Runtime {
    fn build(args: &Args, config: &FileConfig) -> Result<Self> {
        let cache = open_cache(session_file(args, config))?;
        let loaded = cache
            .load_record()
            .context("Failed to load cached session")?;
        let credentials = match &loaded {
            Some(record) => {
                info!(account = %record.account_id, "using cached session");
                record.cookies.clone()
            }
            None => {
                warn!("no cached session; requests are anonymous (run `session set`)");
                CredentialSet::new()
            }
        };
        let session = Arc::new(Session::new(credentials));

        let signer_url = args
            .signer_url
            .clone()
            .or_else(|| config.signer_url.clone())
            .unwrap_or_else(|| DEFAULT_SIGNER_URL.to_string());
        let oracle = HttpSigningOracle::new(signer_url, SIGNER_TIMEOUT)
            .context("Failed to create signing oracle client")?;
        let signer =
            SignatureEnvelopeBuilder::new(Arc::new(ExclusiveOracle::new(Arc::new(oracle))));

        let pipeline_config = pipeline_config(args, config);
        let mut pipeline = RequestPipeline::new(pipeline_config, signer, Arc::clone(&session))
            .context("Failed to create HTTP client")?;
        let proxies = merged_proxies(args, config);
        if !proxies.is_empty() {
            info!(proxies = proxies.len(), "proxy pool enabled");
            pipeline = pipeline.with_proxy_pool(Arc::new(ProxyPool::new(proxies)));
        }

        let mut options = ClientOptions::default();
        if let Some(cap) = config.reply_cap {
            options.reply_cap = cap;
        }
        if let Some(fan_out) = config.reply_fan_out {
            options.reply_fan_out = fan_out;
        }
        let client =
            XhsClient::new(Arc::new(pipeline), options).context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            session,
            cache,
            loaded,
        })
    }

    async fn dispatch(&self, command: &Command) -> Result<ProcessExit> {
        match command {
            Command::Search {
                keyword,
                page,
                page_size,
                sort,
                note_type,
                all,
                max_items,
            } => {
                let request = SearchRequest {
                    keyword: keyword.clone(),
                    page: *page,
                    page_size: *page_size,
                    sort: (*sort).into(),
                    note_type: (*note_type).into(),
                };
                if *all {
                    let notes = self
                        .client
                        .search_paginator(request)
                        .collect_all(*max_items)
                        .await?;
                    print_json(&notes)?;
                } else {
                    print_json(&self.client.search_notes(&request).await?)?;
                }
            }
            Command::Note { input } => match self.client.note_from_input(input).await? {
                Some(detail) => print_json(&detail)?,
                None => bail!("note not found: {input}"),
            },
            Command::Comments {
                input,
                cursor,
                count,
                no_replies,
                reply_cap,
            } => {
                let note = self.locate_note(input).await?;
                let client = match reply_cap {
                    Some(cap) => self.with_reply_cap(usize::try_from(*cap)?)?,
                    None => self.client.clone(),
                };
                let page = client.comments(&note, cursor, *count, !no_replies).await?;
                print_json(&page)?;
            }
            Command::User { input } => {
                let user = parse_user_ref(input)?;
                print_json(&self.client.user_profile(&user.user_id).await?)?;
            }
            Command::UserNotes {
                input,
                cursor,
                all,
                max_items,
            } => {
                let user = parse_user_ref(input)?;
                if *all {
                    let paginator = self.client.user_notes_paginator(user);
                    let notes: Vec<_> = paginator
                        .list_from(cursor.clone(), *max_items)
                        .try_collect()
                        .await?;
                    print_json(&notes)?;
                } else {
                    print_json(&self.client.user_notes(&user, cursor).await?)?;
                }
            }
            Command::Batch(BatchCommand::Notes { inputs }) => {
                let inputs = if inputs.is_empty() {
                    split_lines(&read_stdin()?)
                } else {
                    inputs.clone()
                };
                let report = self.client.batch_note_details(&inputs).await;
                print_json(&report)?;
                return Ok(batch_exit(
                    report.fetched,
                    report.failed,
                    report.reauth_failures(),
                ));
            }
            Command::Batch(BatchCommand::Urls { file }) => {
                let text = match file {
                    Some(path) => std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read '{}'", path.display()))?,
                    None => read_stdin()?,
                };
                let report: UrlBatchReport = self.client.batch_from_text(&text).await;
                print_json(&report)?;
                let failed = report.failed();
                return Ok(batch_exit(
                    report.total() - failed,
                    failed,
                    report.reauth_failures(),
                ));
            }
            Command::Session(_) | Command::Proxy(_) => {
                bail!("command is not a data command")
            }
        }
        Ok(ProcessExit::Success)
    }

    async fn locate_note(&self, input: &str) -> Result<NoteLocator> {
        let note = parse_note_ref(input)?;
        Ok(self.client.resolve_note_ref(&note).await?)
    }

    fn with_reply_cap(&self, cap: usize) -> Result<XhsClient> {
        let mut options = self.client.options().clone();
        options.reply_cap = cap;
        Ok(XhsClient::new(Arc::clone(self.client.pipeline()), options)?)
    }

    /// Drops a cached session the platform no longer accepts.
    fn discard_session(&self) {
        error!("session rejected by the platform; clearing cached session");
        if let Err(err) = self.cache.clear() {
            warn!(error = %err, "could not clear cached session");
        }
    }

    /// Saves the session back when responses rotated any cookie.
    fn persist_rotated_cookies(&self) {
        let Some(loaded) = &self.loaded else {
            return;
        };
        let current = self.session.snapshot();
        if current == loaded.cookies {
            return;
        }
        match self.cache.update_cookies(loaded, &current) {
            Ok(_) => debug!("rotated cookies saved"),
            Err(err) => warn!(error = %err, "could not save rotated cookies"),
        }
    }
}

fn pipeline_config(args: &Args, config: &FileConfig) -> PipelineConfig {
    let mut pipeline = PipelineConfig::default();
    if let Some(host) = args.api_host.clone().or_else(|| config.api_host.clone()) {
        pipeline.api_host = host.trim_end_matches('/').to_string();
    }
    if let Some(secs) = args.timeout_secs.or(config.timeout_secs) {
        pipeline.timeout = Duration::from_secs(secs);
    }
    let attempts = args
        .max_attempts
        .or(config.max_attempts)
        .unwrap_or(pipeline.retry.max_attempts());
    let delay = config
        .retry_delay_ms
        .map_or(pipeline.retry.delay(), Duration::from_millis);
    pipeline.retry = RetryPolicy::new(attempts, delay);
    pipeline
}

fn session_ttl(config: &FileConfig) -> Duration {
    config
        .session_ttl_hours
        .map_or(DEFAULT_SESSION_TTL, |hours| {
            Duration::from_secs(hours.saturating_mul(3600))
        })
}

fn run_session_command(
    args: &Args,
    config: &FileConfig,
    action: &SessionCommand,
) -> Result<ProcessExit> {
    let cache = open_cache(session_file(args, config))?;
    match action {
        SessionCommand::Set { cookies, ttl_hours } => {
            let raw = match cookies {
                Some(raw) => raw.clone(),
                None => read_stdin()?,
            };
            let credentials = CredentialSet::from_cookie_header(raw.trim());
            if !credentials.is_usable() {
                bail!("cookie string must contain non-empty `a1` and `web_session` cookies");
            }
            let ttl = ttl_hours.map_or_else(
                || session_ttl(config),
                |hours| Duration::from_secs(hours * 3600),
            );
            let record = cache.save(&credentials.account_id(), &credentials, Some(ttl))?;
            print_json(&json!({
                "account_id": record.account_id,
                "cookies": credentials.names().collect::<Vec<_>>(),
                "expires_at": record.expires_at,
            }))?;
        }
        SessionCommand::Show => match cache.record()? {
            Some(record) => {
                let expired = cache.load()?.is_none();
                print_json(&json!({
                    "account_id": record.account_id,
                    "cookies": record.cookies.names().collect::<Vec<_>>(),
                    "issued_at": record.issued_at,
                    "expires_at": record.expires_at,
                    "expired": expired,
                }))?;
            }
            None => print_json(&json!({ "session": null }))?,
        },
        SessionCommand::Clear => {
            let removed = cache.clear()?;
            print_json(&json!({ "removed": removed }))?;
        }
    }
    Ok(ProcessExit::Success)
}

#[derive(Serialize)]
struct ProbeResult {
    proxy: String,
    healthy: bool,
}

async fn run_proxy_test(proxies: &[String], probe_url: &str, timeout: Duration) -> Result<ProcessExit> {
    if proxies.is_empty() {
        bail!("no proxies given (pass them as arguments, --proxy, or `proxies` in config)");
    }
    let results: Vec<ProbeResult> = future::join_all(proxies.iter().map(|proxy| async move {
        ProbeResult {
            proxy: redact(proxy),
            healthy: test_proxy(proxy, probe_url, timeout).await,
        }
    }))
    .await;
    let healthy = results.iter().filter(|result| result.healthy).count();
    info!(healthy, total = results.len(), "proxy probe finished");
    print_json(&results)?;
    Ok(batch_exit(healthy, results.len() - healthy, 0))
}

/// Success when nothing failed; auth-required when every failure needs a
/// renewed session; partial when some items succeeded.
fn batch_exit(succeeded: usize, failed: usize, reauth_failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if reauth_failed == failed {
        ProcessExit::AuthRequired
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn read_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        bail!("no input given and stdin is a terminal");
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read stdin")?;
    Ok(buffer)
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
