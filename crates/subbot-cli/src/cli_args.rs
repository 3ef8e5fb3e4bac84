use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use subbot_reddit::{Credentials, DEFAULT_API_BASE, DEFAULT_AUTH_BASE};
use subbot_runtime::{BotRuntimeConfig, DEFAULT_COMMENT_EVENT_TAG, DEFAULT_STREAM_URL};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "substitute-bot",
    about = "Replies to s/pattern/replacement/ comments with the substituted parent text",
    version
)]
pub(crate) struct Cli {
    #[arg(long, env = "SUBSTITUTE_BOT_USERNAME", help = "Bot account username")]
    pub(crate) username: Option<String>,

    #[arg(
        long,
        env = "SUBSTITUTE_BOT_PASSWORD",
        hide_env_values = true,
        help = "Bot account password"
    )]
    pub(crate) password: Option<String>,

    #[arg(long = "client-id", env = "SUBSTITUTE_BOT_CLIENT_ID", help = "OAuth client id")]
    pub(crate) client_id: Option<String>,

    #[arg(
        long = "client-secret",
        env = "SUBSTITUTE_BOT_CLIENT_SECRET",
        hide_env_values = true,
        help = "OAuth client secret"
    )]
    pub(crate) client_secret: Option<String>,

    #[arg(
        long = "user-agent",
        env = "SUBSTITUTE_BOT_USER_AGENT",
        help = "User-Agent sent on every API request"
    )]
    pub(crate) user_agent: Option<String>,

    #[arg(
        long = "stream-url",
        env = "SUBSTITUTE_BOT_STREAM_URL",
        default_value = DEFAULT_STREAM_URL,
        help = "Comment feed URL (server-sent events)"
    )]
    pub(crate) stream_url: String,

    #[arg(
        long = "api-base",
        env = "SUBSTITUTE_BOT_API_BASE",
        default_value = DEFAULT_API_BASE,
        help = "Base URL for authenticated API calls"
    )]
    pub(crate) api_base: String,

    #[arg(
        long = "auth-base",
        env = "SUBSTITUTE_BOT_AUTH_BASE",
        default_value = DEFAULT_AUTH_BASE,
        help = "Base URL for the access token endpoint"
    )]
    pub(crate) auth_base: String,

    #[arg(
        long,
        env = "SUBSTITUTE_BOT_WORKERS",
        default_value_t = 16,
        value_parser = parse_positive_usize,
        help = "Number of comment workers, each with its own API client"
    )]
    pub(crate) workers: usize,

    #[arg(
        long = "queue-capacity",
        env = "SUBSTITUTE_BOT_QUEUE_CAPACITY",
        default_value_t = 4096,
        value_parser = parse_positive_usize,
        help = "Events buffered between the stream reader and the workers"
    )]
    pub(crate) queue_capacity: usize,

    #[arg(
        long = "archive-max-len",
        env = "SUBSTITUTE_BOT_ARCHIVE_MAX_LEN",
        default_value_t = 50,
        value_parser = parse_positive_usize,
        help = "Number of posted replies kept in the archive"
    )]
    pub(crate) archive_max_len: usize,

    #[arg(
        long = "high-water-mark-ttl-secs",
        env = "SUBSTITUTE_BOT_HIGH_WATER_MARK_TTL_SECS",
        default_value_t = 15 * 60,
        value_parser = parse_positive_u64,
        help = "Seconds the resume cursor survives without updates"
    )]
    pub(crate) high_water_mark_ttl_secs: u64,

    #[arg(
        long = "processed-ttl-secs",
        env = "SUBSTITUTE_BOT_PROCESSED_TTL_SECS",
        default_value_t = 5 * 60,
        value_parser = parse_positive_u64,
        help = "Seconds a processed-comment marker is kept"
    )]
    pub(crate) processed_ttl_secs: u64,

    #[arg(
        long = "token-freshness-secs",
        env = "SUBSTITUTE_BOT_TOKEN_FRESHNESS_SECS",
        default_value_t = 40 * 60,
        value_parser = parse_positive_u64,
        help = "Seconds an access token is reused before renewal"
    )]
    pub(crate) token_freshness_secs: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "SUBSTITUTE_BOT_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for API requests and for connecting to the feed"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "heartbeat-interval-secs",
        env = "SUBSTITUTE_BOT_HEARTBEAT_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Seconds between progress log lines"
    )]
    pub(crate) heartbeat_interval_secs: u64,

    #[arg(
        long = "comment-event-tag",
        env = "SUBSTITUTE_BOT_COMMENT_EVENT_TAG",
        default_value = DEFAULT_COMMENT_EVENT_TAG,
        help = "Feed event type that carries comments"
    )]
    pub(crate) comment_event_tag: String,

    #[arg(
        long = "store-path",
        env = "SUBSTITUTE_BOT_STORE_PATH",
        help = "SQLite file for the resume cursor, markers and reply archive; in-memory when unset"
    )]
    pub(crate) store_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum CliCommand {
    /// Stream comments and reply to substitution requests (default).
    Run,
    /// Print the most recent archived replies as JSON lines.
    Replies {
        #[arg(long, default_value_t = 50, value_parser = parse_positive_usize)]
        count: usize,
    },
}

impl Cli {
    pub(crate) fn command(&self) -> CliCommand {
        self.command.clone().unwrap_or(CliCommand::Run)
    }

    pub(crate) fn runtime_config(&self) -> BotRuntimeConfig {
        BotRuntimeConfig {
            credentials: Credentials {
                username: self.username.clone().unwrap_or_default(),
                password: self.password.clone().unwrap_or_default(),
                client_id: self.client_id.clone().unwrap_or_default(),
                client_secret: self.client_secret.clone().unwrap_or_default(),
                user_agent: self.user_agent.clone().unwrap_or_default(),
            },
            stream_url: self.stream_url.clone(),
            api_base: self.api_base.clone(),
            auth_base: self.auth_base.clone(),
            worker_count: self.workers,
            queue_capacity: self.queue_capacity,
            archive_max_len: self.archive_max_len,
            high_water_mark_ttl: Duration::from_secs(self.high_water_mark_ttl_secs),
            processed_ttl: Duration::from_secs(self.processed_ttl_secs),
            token_freshness: Duration::from_secs(self.token_freshness_secs),
            request_timeout_ms: self.request_timeout_ms,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            comment_event_tag: self.comment_event_tag.clone(),
            ..BotRuntimeConfig::default()
        }
    }
}
