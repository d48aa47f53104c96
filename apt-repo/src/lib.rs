pub mod cli;
pub mod freight;
pub mod github;
pub mod load_config;

pub use cli::{run, Cli, ExitStatus};
