//! Event processing runtime for substitute-bot.
//!
//! Wires the comment feed into a pool of workers, applies the reply policy
//! to each comment and reports progress through a periodic heartbeat.

mod bot_runtime;
mod comment_policy;
mod event_worker;
mod heartbeat_runtime;
mod runtime_config;
mod runtime_counters;

pub use bot_runtime::{run_substitute_bot, run_with_comment_apis, BotRunSummary};
pub use comment_policy::{
    CommentOutcome, CommentPolicy, CommentPolicyConfig, FailureKind, SkipReason,
};
pub use event_worker::{spawn_event_workers, EventWorker};
pub use heartbeat_runtime::{start_bot_heartbeat, BotHeartbeatHandle, QueueDepthProbe};
pub use runtime_config::{
    BotRuntimeConfig, DEFAULT_COMMENT_EVENT_TAG, DEFAULT_REPLY_FOOTER, DEFAULT_STREAM_URL,
};
pub use runtime_counters::{RuntimeCounters, RuntimeCountersSnapshot};
