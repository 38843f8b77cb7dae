mod rate_policy;
mod relay;
mod subject;
mod token;

pub use rate_policy::*;
pub use relay::*;
pub use subject::*;
pub use token::*;
