pub mod chain;
pub mod credential;

pub use chain::*;
pub use credential::*;
