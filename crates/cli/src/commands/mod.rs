//! Subcommands of the `bulk-kit` binary.

pub mod init;
pub mod jobs;
pub mod run;
