//! Metadata resolution: work-code extraction, cache consult, catalog
//! fetch, and the Chinese-translation title preference.

mod resolver;

pub use resolver::{MetadataResolver, kana_ratio_exceeded};
