mod forwarder_impl;
mod rate_limiter_impl;
mod session_manager_impl;
mod token_codec_jwt;
mod user_directory_fake;

pub use forwarder_impl::*;
pub use rate_limiter_impl::*;
pub use session_manager_impl::*;
pub use token_codec_jwt::*;
pub use user_directory_fake::*;
