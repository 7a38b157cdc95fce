//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use xhs_core::api::{SearchNoteType, SearchSort};

/// Query Xiaohongshu notes, comments and users through the signed web API.
///
/// Results are printed as JSON on stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "xhs-crawler")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base URL of the signing service
    #[arg(long, global = true)]
    pub signer_url: Option<String>,

    /// API host (scheme and authority)
    #[arg(long, global = true)]
    pub api_host: Option<String>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Attempts per request, transport failures only (1-10)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Proxy address; repeat for a pool
    #[arg(long = "proxy", global = true)]
    pub proxies: Vec<String>,

    /// Encrypted session file
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search notes by keyword
    Search {
        /// Search keyword
        keyword: String,
        /// 1-based page number
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
        /// Results per page
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..=100))]
        page_size: u32,
        /// Result ordering
        #[arg(long, value_enum, default_value_t = SortArg::General)]
        sort: SortArg,
        /// Note type filter
        #[arg(long = "type", value_enum, default_value_t = NoteTypeArg::All)]
        note_type: NoteTypeArg,
        /// Follow pages until exhausted or --max-items
        #[arg(long)]
        all: bool,
        /// Item limit with --all
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Fetch one note by id, URL or short link
    Note {
        /// Note id, note URL, or xhslink.com short link
        input: String,
    },

    /// List comments of a note
    Comments {
        /// Note id, note URL, or xhslink.com short link
        input: String,
        /// Continuation cursor from a previous call
        #[arg(long, default_value = "")]
        cursor: String,
        /// Minimum number of comments to gather (whole pages)
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// Do not fetch replies
        #[arg(long)]
        no_replies: bool,
        /// Replies per comment (1-100)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=100))]
        reply_cap: Option<u64>,
    },

    /// Fetch a user profile
    User {
        /// User id or profile URL
        input: String,
    },

    /// List notes posted by a user
    UserNotes {
        /// User id or profile URL
        input: String,
        /// Continuation cursor from a previous call
        #[arg(long, default_value = "")]
        cursor: String,
        /// Follow pages until exhausted or --max-items
        #[arg(long)]
        all: bool,
        /// Item limit with --all
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Fetch many items, reporting failures per item
    #[command(subcommand)]
    Batch(BatchCommand),

    /// Manage the cached session
    #[command(subcommand)]
    Session(SessionCommand),

    /// Proxy utilities
    #[command(subcommand)]
    Proxy(ProxyCommand),
}

#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Note details for each id, URL or short link
    Notes {
        /// Inputs; read from stdin when omitted
        inputs: Vec<String>,
    },
    /// Notes and profiles from comma- or newline-separated text
    Urls {
        /// Text file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Save a browser cookie string as the active session
    Set {
        /// `a1=...; web_session=...`; read from stdin when omitted
        cookies: Option<String>,
        /// Session lifetime in hours (1-720)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=720))]
        ttl_hours: Option<u64>,
    },
    /// Show the cached session (cookie names only)
    Show,
    /// Remove the cached session
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Probe proxies and report which respond
    Test {
        /// Proxies to probe; configured ones when omitted
        proxies: Vec<String>,
        /// Probe URL
        #[arg(long)]
        probe_url: Option<String>,
        /// Probe timeout in seconds
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=300))]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    General,
    Popular,
    Latest,
}

impl From<SortArg> for SearchSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::General => Self::General,
            SortArg::Popular => Self::Popularity,
            SortArg::Latest => Self::Latest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NoteTypeArg {
    All,
    Video,
    Image,
}

impl From<NoteTypeArg> for SearchNoteType {
    fn from(value: NoteTypeArg) -> Self {
        match value {
            NoteTypeArg::All => Self::All,
            NoteTypeArg::Video => Self::Video,
            NoteTypeArg::Image => Self::Image,
        }
    }
}
