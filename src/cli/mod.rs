//! Terminal front end: argument parsing and the interactive loop.

pub mod args;
pub mod repl;

pub use args::Args;
pub use repl::Repl;
