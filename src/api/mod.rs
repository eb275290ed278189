//! Remote news API access.
//!
//! - [`types`] - Wire and domain types for articles and navigation blocks
//! - [`client`] - The [`FeedSource`] seam and its HTTP implementation
//!
//! The client issues exactly one request per call and reports failures through
//! [`ApiError`]; deciding what to do about them is left to the composer.

mod client;
mod types;

pub use client::{ApiError, Connectivity, FeedClient, FeedSource};
pub use types::{Article, ArticleFields, ArticlePage, NavigationBlock, NavigationMode};
