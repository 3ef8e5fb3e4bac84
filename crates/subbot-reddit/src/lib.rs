//! Authenticated client for the comment API used by substitute-bot.
//!
//! `AuthSession` owns the bearer token and renews it with the double-checked
//! renewal pattern; `RedditApiClient` fetches comments by fullname and posts
//! replies, asking the session for a token right before every request.

mod auth_session;
mod comment;
mod credentials;
mod error;
mod reddit_api_client;

pub use auth_session::{
    AuthSession, PasswordGrantTokenSource, TokenSource, DEFAULT_TOKEN_FRESHNESS,
};
pub use comment::{is_comment_fullname, Comment, COMMENT_FULLNAME_PREFIX, COMMENT_KIND};
pub use credentials::Credentials;
pub use error::RedditApiError;
pub use reddit_api_client::{
    CommentApi, RedditApiClient, RedditApiConfig, DEFAULT_API_BASE, DEFAULT_AUTH_BASE,
};
