//! Startup configuration: a TOML file overlaid by `TOLLGATE__*` environment
//! variables. See `bin/settings_demo.rs` for a quick look at the merged result.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
