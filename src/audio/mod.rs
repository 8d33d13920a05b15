//! Audio decoding

pub mod decoder;

pub use decoder::decode_mono;
