mod clock;

pub use clock::*;

// store

mod auth_session_store;
mod kv_store;

pub use auth_session_store::*;
pub use kv_store::*;

// remote services

mod upstream;
mod user_directory;

pub use upstream::*;
pub use user_directory::*;
