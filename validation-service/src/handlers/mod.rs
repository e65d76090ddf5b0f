pub mod health;
pub mod hooks;
pub mod results;
pub mod session;
pub mod status;
pub mod validate;

pub use health::{health_check, metrics};
