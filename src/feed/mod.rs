//! Feed composition: what the user sees and how it gets loaded.
//!
//! - [`layout`] - pure filtering by tab and navigation-block interleaving
//! - [`composer`] - the loading state machine (initial load, refresh, load
//!   more, offline fallback) on top of the API client and stores
//!
//! # Example
//!
//! ```ignore
//! let mut composer = FeedComposer::new(source, cache, saved).await;
//! composer.load_initial_data().await;
//! for item in composer.list_items() {
//!     println!("{}", item.id());
//! }
//! ```

mod composer;
mod layout;

pub use composer::{FeedComposer, LoadState, Pagination, NO_CONNECTION_MESSAGE, PAGE_SIZE};
pub use layout::{compose, filter_articles, ListItem, ListingTab, NAVIGATION_SLOTS};
