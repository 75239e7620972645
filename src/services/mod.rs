pub mod credential;
pub mod hybrid;
pub mod integrity;

pub use credential::CredentialService;
pub use hybrid::HybridStorageService;
pub use integrity::{IntegrityReport, IntegrityVerifier};
