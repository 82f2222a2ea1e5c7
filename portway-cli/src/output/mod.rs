//! Output formatting for CLI.

mod json;
mod text;

pub use json::{ConfigOutput, JsonFormatter};
pub use text::TextFormatter;
