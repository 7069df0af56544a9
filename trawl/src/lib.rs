pub mod commands;
pub mod handlers;

pub use handlers::{handle_crawl, parse_seed, resolve_output_path};
