//! Terminal output and prompts.

pub mod output;
pub mod prompts;

pub use output::{error, flag, header, info, kv, success, warning};
