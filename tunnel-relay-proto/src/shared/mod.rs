mod request;
mod response;
mod role;
pub mod validate;

pub use request::*;
pub use response::*;
pub use role::*;
pub use validate::*;
