pub mod crypto;
pub mod errors;
pub mod ipfs;
