//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// nostr-bridge: relay channel ↔ Telegram bridge with a retrieval-augmented `/q` command.
///
/// Forwards channel messages from several relays into a Telegram chat,
/// posts chat messages back to the channel, and answers `/q` questions with
/// a local language model and a knowledge-base search.
#[derive(Parser, Debug)]
#[command(name = "nostr-bridge")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "BRIDGE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for command results (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Language model name. Overrides `OLLAMA_MODEL`.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Model host URL. Overrides `OLLAMA_URL`.
    #[arg(long, global = true)]
    pub llm_url: Option<String>,

    /// Directory with prompt template overrides. Overrides `BRIDGE_PROMPT_DIR`.
    #[arg(long, global = true)]
    pub prompt_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log line formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge until interrupted.
    ///
    /// Requires `NOSTR_CHANNEL_ID`, `BOT_NOSTR_PRIV_KEY`, `TELEGRAM_BOT_TOKEN`,
    /// `CHATID`, `RAG_URL` and `OLLAMA_MODEL`.
    #[command(after_help = r#"Examples:
  nostr-bridge run
  nostr-bridge run --relay wss://relay.damus.io --relay wss://nos.lol
  nostr-bridge --log-format json run
"#)]
    Run {
        /// Relay to subscribe to (repeatable). Overrides `NOSTR_RELAYS`.
        #[arg(long = "relay")]
        relays: Vec<String>,

        /// Relay to publish to. Overrides `NOSTR_PUBLISH_RELAY`.
        #[arg(long)]
        publish_relay: Option<String>,

        /// Query command prefix. Overrides `BRIDGE_COMMAND_PREFIX`.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Answer one question with the full pipeline and print the answer.
    ///
    /// Needs `RAG_URL` and `OLLAMA_MODEL`; no relay or chat settings.
    #[command(after_help = r#"Examples:
  nostr-bridge ask "what is fog computing?"
  nostr-bridge --format json ask "how do relays work?" | jq .search_query
"#)]
    Ask {
        /// The question.
        question: String,

        /// Retrieval service URL. Overrides `RAG_URL`.
        #[arg(long, env = "RAG_URL")]
        rag_url: String,
    },

    /// Print the search query the optimizer derives from a question.
    Optimize {
        /// The question.
        question: String,
    },

    /// Read model output from stdin and print the object it contains.
    ///
    /// Prints `null` when no JSON object can be recovered.
    #[command(after_help = r#"Examples:
  echo '```json
{"query": unquoted}
```' | nostr-bridge extract
"#)]
    Extract,

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    InitPrompts {
        /// Target directory.
        dir: PathBuf,
    },
}
