// Constants for the credential storage engine

// Marker kinds recognized on the ledger. The colon-delimited marker format
// is an at-rest contract shared with other implementations; the strings
// below must not change.
pub const KIND_CREDENTIAL_DATA: &str = "CREDENTIAL_DATA";
pub const KIND_CREDENTIAL_BATCH: &str = "CREDENTIAL_BATCH";
pub const KIND_CREDENTIAL_PALLET: &str = "CREDENTIAL_PALLET";
pub const KIND_SECURE_CREDENTIAL: &str = "SECURE_CREDENTIAL";
pub const KIND_SECURE_BATCH: &str = "SECURE_BATCH";

// Chunking
pub const REMARK_CHUNK_SIZE: usize = 1000; // bytes of ciphertext per remark
pub const SINGLE_MARKER_MAX_SIZE: usize = REMARK_CHUNK_SIZE;

// Block scanning
pub const DEFAULT_SCAN_DEPTH: u64 = 100; // recent blocks inspected on retrieval

// Transaction monitoring
pub const MONITOR_POLL_INTERVAL_MS: u64 = 6_000; // matches expected block time
pub const MONITOR_MAX_RETRIES: u32 = 20;
pub const MONITOR_TIMEOUT_SECS: u64 = 180;

// Cost estimation multipliers, relative to a single remark
pub const COST_REMARK_CHUNK: f64 = 1.0;
pub const COST_BATCH: f64 = 0.8;
pub const COST_SINGLE_MARKER: f64 = 1.0;

// Validation
pub const MAX_CREDENTIAL_DATA_BYTES: usize = 64 * 1024;

// Encryption envelope layout
pub const ENVELOPE_IV_LEN: usize = 12;
pub const ENVELOPE_TAG_LEN: usize = 16;

// IPFS defaults
pub const IPFS_API_URL: &str = "http://127.0.0.1:5001/api/v0";
pub const IPFS_GATEWAY_URL: &str = "http://127.0.0.1:8080/ipfs";
