mod auth_session_store_kv;
mod kv_store_memory;
mod kv_store_redis;

pub use auth_session_store_kv::*;
pub use kv_store_memory::*;
pub use kv_store_redis::*;
