//! Result export

pub mod json;

pub use json::{read_result, result_path, write_result};
