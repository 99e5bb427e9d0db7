//! labnet CLI - lease, release and inspect lab subnets from the shell.

pub mod commands;
pub mod output;
