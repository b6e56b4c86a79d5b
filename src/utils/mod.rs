pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{InputKind, discover_inputs, is_fetchable_url, output_path};
