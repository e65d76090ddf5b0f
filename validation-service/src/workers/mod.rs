mod bids;
mod dispatcher;
pub mod executor;
mod nix;
mod odml;
mod pipeline;
#[cfg(test)]
mod test_support;
pub mod validator;

pub use bids::BidsValidator;
pub use dispatcher::{DispatchError, JobDispatcher, JobHandle, JobKey, JobSlot, ValidationJob};
pub use executor::{CommandExecutor, ExecError};
pub use nix::NixValidator;
pub use odml::OdmlValidator;
pub use pipeline::ValidationPipeline;
pub use validator::{classify, ValidatorAdapter, ValidatorOutcome, ValidatorRegistry};
