mod article_cache;
mod saved_lists;
mod schema;
mod types;

pub use article_cache::ArticleCache;
pub use saved_lists::SavedLists;
pub use schema::Database;
pub use types::{DatabaseError, ListKind, SavedListsSnapshot};
