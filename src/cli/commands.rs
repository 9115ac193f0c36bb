//! # CLI Commands / 命令行子命令
//!
//! One module per subcommand.

pub mod init;
pub mod list;
pub mod run;
pub mod show;
