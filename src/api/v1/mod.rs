mod error;
mod handler;
mod router;

pub use error::{ApiError, ApiErrorCode, recover_error};
pub use router::{REGISTER_TARGET, SMS_SEND_TARGET, resolve_client_key, routes};
