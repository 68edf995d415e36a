pub mod iso8601;
mod macros;
pub mod parsing;
