//! Cache module for storing fetched quotes on disk
//!
//! This module provides a cache store that persists quotes to a comma-delimited
//! text file and tracks when it was last written. Reads tolerate the older
//! space-delimited and raw `SYMBOL: PRICE$` row formats.

mod store;

pub use store::{
    not_in_cache, parse_line, CacheError, CacheStore, CACHE_FILE_NAME, CACHE_HEADER,
    MARKER_FILE_NAME,
};
