mod upstream_http;
mod user_directory_http;

pub use upstream_http::*;
pub use user_directory_http::*;
