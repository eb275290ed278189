//! Small helpers shared by the library and the CLI.
//!
//! - **URL validation**: base URL policy for the API client
//! - **Text**: terminal-safe, width-aware rendering of remote text

mod text;
mod url_validator;

pub use text::{display_width, single_line, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_base_url, UrlValidationError};
