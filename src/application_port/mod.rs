mod forwarder;
mod rate_limiter;
mod session_manager;

pub use forwarder::*;
pub use rate_limiter::*;
pub use session_manager::*;
