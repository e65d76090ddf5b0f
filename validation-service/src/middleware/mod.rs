pub mod session;

pub use session::AuthenticatedUser;
