//! Remote work-catalog client.
//!
//! The catalog exposes one JSON endpoint, `product.json`, returning an
//! array whose first element is the work record. Responses are memoised
//! for 24 hours; translation-linkage traversal builds on the same fetch.

mod client;
mod types;

pub use client::CatalogClient;
pub use types::{
    LanguageEdition, LinkedWork, ProductRecord, TranslationInfo, TranslationStatus,
};
