//! Tracing setup plus the macros every other module logs through.
//! `bin/token_demo.rs` shows the filter being reloaded at runtime.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
