pub mod client;
pub mod parser;
pub mod prompts;
pub mod types;

pub use client::*;
pub use parser::*;
pub use types::*;
