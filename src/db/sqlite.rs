use crate::utils::errors::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credential_types (
    id                 TEXT PRIMARY KEY,
    name               TEXT NOT NULL UNIQUE,
    description        TEXT,
    schema_version     TEXT NOT NULL,
    schema_definition  TEXT NOT NULL,
    issuer_pattern     TEXT,
    required_fields    TEXT NOT NULL,
    optional_fields    TEXT NOT NULL,
    validation_rules   TEXT,
    is_active          INTEGER NOT NULL DEFAULT 1,
    created_by         TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credentials (
    id                  TEXT PRIMARY KEY,
    user_address        TEXT NOT NULL,
    credential_type_id  TEXT NOT NULL REFERENCES credential_types(id),
    issuer_address      TEXT NOT NULL,
    issuer_name         TEXT,
    credential_data     TEXT,
    credential_hash     TEXT NOT NULL,
    proof_signature     TEXT,
    status              TEXT NOT NULL DEFAULT 'active',
    issued_at           TEXT NOT NULL,
    expires_at          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    metadata            TEXT,
    storage_type        TEXT NOT NULL DEFAULT 'local',
    blob_hash           TEXT,
    chain_block_ref     TEXT,
    chain_extrinsic_ref TEXT
);
CREATE INDEX IF NOT EXISTS idx_credentials_user ON credentials(user_address);
CREATE INDEX IF NOT EXISTS idx_credentials_issuer ON credentials(issuer_address);
CREATE INDEX IF NOT EXISTS idx_credentials_status ON credentials(status);

CREATE TABLE IF NOT EXISTS credential_shares (
    id                  TEXT PRIMARY KEY,
    credential_id       TEXT NOT NULL REFERENCES credentials(id),
    shared_with_address TEXT NOT NULL,
    shared_by_address   TEXT NOT NULL,
    permissions         TEXT NOT NULL,
    access_level        TEXT NOT NULL,
    expires_at          TEXT,
    is_active           INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shares_grantee ON credential_shares(shared_with_address);

CREATE TABLE IF NOT EXISTS credential_verifications (
    id                TEXT PRIMARY KEY,
    credential_id     TEXT NOT NULL REFERENCES credentials(id),
    verifier_address  TEXT NOT NULL,
    verification_type TEXT NOT NULL,
    verification_data TEXT,
    status            TEXT NOT NULL,
    verified_at       TEXT NOT NULL,
    notes             TEXT
);
CREATE INDEX IF NOT EXISTS idx_verifications_credential ON credential_verifications(credential_id);

CREATE TABLE IF NOT EXISTS issuance_requests (
    id                   TEXT PRIMARY KEY,
    requester_address    TEXT NOT NULL,
    issuer_address       TEXT NOT NULL,
    credential_type_id   TEXT NOT NULL REFERENCES credential_types(id),
    request_data         TEXT NOT NULL,
    status               TEXT NOT NULL DEFAULT 'pending',
    approved_at          TEXT,
    rejected_at          TEXT,
    rejection_reason     TEXT,
    issued_credential_id TEXT,
    expires_at           TEXT,
    created_at           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_requests_issuer ON issuance_requests(issuer_address);

CREATE TABLE IF NOT EXISTS credential_revocations (
    id                 TEXT PRIMARY KEY,
    credential_id      TEXT NOT NULL UNIQUE REFERENCES credentials(id),
    revoked_by_address TEXT NOT NULL,
    reason             TEXT,
    revoked_at         TEXT NOT NULL
);
"#;

/// Open (creating if necessary) the local store and apply the schema.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);

    // One connection: SQLite serializes writers anyway, and an in-memory
    // database is per-connection, so a wider pool would see different data.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    // Multi-statement DDL has to bypass the prepared-statement path.
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    Ok(pool)
}
