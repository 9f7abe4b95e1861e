pub mod commands;
pub mod output;
pub mod worklist;

pub use commands::{CallArgs, CliArgs, Commands, IdCommand, OutputFormatArg, RunArgs};
pub use output::{OutputFormat, OutputFormatter};
