//! Post-extraction transforms: directory rename from metadata, rule-based
//! file filtering, single-subfolder flattening, and empty-directory pruning.

mod filter;
mod flatten;
mod rename;

pub use filter::{FilterOutcome, apply_filters};
pub use flatten::{flatten_single_subfolder, remove_empty_dirs};
pub use rename::{compile_name, rename_directory, sanitize_filename};
