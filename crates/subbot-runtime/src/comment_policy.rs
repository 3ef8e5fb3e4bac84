//! Decides whether a comment gets a reply, and posts and archives it.

use std::sync::Arc;

use subbot_core::truncate_for_error;
use subbot_reddit::{Comment, CommentApi};
use subbot_store::{Reply, ReplyArchive};
use subbot_substitution::{SubstitutionCommand, SubstitutionError};

const LOGGED_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone)]
pub struct CommentPolicyConfig {
    pub bot_username: String,
    pub reply_footer: String,
    pub archive_max_len: usize,
}

/// Why a comment was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DeletedComment,
    OwnComment,
    NonCommentParent,
    NotACommand,
    DeletedParent,
    OwnParent,
    NoEffect,
    EmptyResult,
}

/// Which step of the policy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ParentFetch,
    Substitution,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    Replied { reply: Box<Reply>, archived: bool },
    Skipped(SkipReason),
    Failed(FailureKind),
}

pub struct CommentPolicy {
    api: Arc<dyn CommentApi>,
    archive: ReplyArchive,
    config: CommentPolicyConfig,
}

impl CommentPolicy {
    pub fn new(
        api: Arc<dyn CommentApi>,
        archive: ReplyArchive,
        config: CommentPolicyConfig,
    ) -> Self {
        Self {
            api,
            archive,
            config,
        }
    }

    pub async fn process_comment(&self, comment: &Comment) -> CommentOutcome {
        if comment.is_deleted() {
            return CommentOutcome::Skipped(SkipReason::DeletedComment);
        }
        if comment.is_authored_by(&self.config.bot_username) {
            return CommentOutcome::Skipped(SkipReason::OwnComment);
        }
        if !comment.has_comment_parent() {
            return CommentOutcome::Skipped(SkipReason::NonCommentParent);
        }

        let Some(mut command) = SubstitutionCommand::parse(&comment.body) else {
            return CommentOutcome::Skipped(SkipReason::NotACommand);
        };
        if !command.replacement.is_empty() {
            command.replacement = format!("**{}**", command.replacement);
        }

        let parent = match self.api.get_comment(&comment.parent_id).await {
            Ok(parent) => parent,
            Err(error) => {
                tracing::warn!(
                    comment = %comment.name,
                    parent = %comment.parent_id,
                    pattern = %command.pattern,
                    replacement = %command.replacement,
                    error = %error,
                    "failed to fetch parent comment"
                );
                return CommentOutcome::Failed(FailureKind::ParentFetch);
            }
        };
        if parent.is_deleted() {
            return CommentOutcome::Skipped(SkipReason::DeletedParent);
        }
        if parent.is_authored_by(&self.config.bot_username) {
            return CommentOutcome::Skipped(SkipReason::OwnParent);
        }

        let parent_body = truncate_for_error(&parent.body, LOGGED_BODY_MAX_CHARS);
        let substituted = match command.run(&parent.body) {
            Ok(substituted) => substituted,
            Err(SubstitutionError::NoEffect) => {
                tracing::debug!(
                    comment = %comment.name,
                    pattern = %command.pattern,
                    replacement = %command.replacement,
                    parent_body = %parent_body,
                    "substitution did not change parent body"
                );
                return CommentOutcome::Skipped(SkipReason::NoEffect);
            }
            Err(error) => {
                tracing::warn!(
                    comment = %comment.name,
                    pattern = %command.pattern,
                    replacement = %command.replacement,
                    parent_body = %parent_body,
                    error = %error,
                    "failed to run substitution"
                );
                return CommentOutcome::Failed(FailureKind::Substitution);
            }
        };
        if substituted.is_empty() {
            tracing::info!(
                comment = %comment.name,
                pattern = %command.pattern,
                replacement = %command.replacement,
                parent_body = %parent_body,
                "substitution produced an empty body"
            );
            return CommentOutcome::Skipped(SkipReason::EmptyResult);
        }

        let reply_body = format!("{substituted}{}", self.config.reply_footer);
        let posted = match self.api.post_reply(&comment.name, &reply_body).await {
            Ok(posted) => posted,
            Err(error) => {
                tracing::warn!(
                    comment = %comment.name,
                    pattern = %command.pattern,
                    replacement = %command.replacement,
                    parent_body = %parent_body,
                    error = %error,
                    "failed to post reply"
                );
                return CommentOutcome::Failed(FailureKind::Post);
            }
        };
        tracing::info!(comment = %comment.name, reply = %posted.name, "posted reply");

        let reply = Reply::from_posted(&comment.author, &posted);
        let archived = match self
            .archive
            .append_with_trim(&reply, self.config.archive_max_len)
            .await
        {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(
                    comment = %comment.name,
                    reply = %posted.name,
                    error = %error,
                    "failed to archive reply"
                );
                false
            }
        };

        CommentOutcome::Replied {
            reply: Box::new(reply),
            archived,
        }
    }
}
