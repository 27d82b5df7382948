//! Tag storage and the processed-entry cache.
//!
//! This module provides:
//! - The [`AttributeStore`] contract and its extended-attribute backend
//! - A TTL cache of entries already classified as ignored

mod processed;
mod xattr;

pub use processed::{Fingerprint, ProcessedCache, DEFAULT_CACHE_TTL};
pub use xattr::{AttributeStore, XattrStore, ATTRIBUTE_NAME, ATTRIBUTE_VALUE};
