//! Stem-set scanning and cache identity

pub mod scanner;

pub use scanner::{cache_key, path_fingerprint, scan};
