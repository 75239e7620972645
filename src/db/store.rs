use crate::models::{
    Credential, CredentialRevocation, CredentialShare, CredentialStatus, CredentialType,
    CredentialVerification, IssuanceRequest, IssuanceStatus, StorageStats, StorageType,
};
use crate::utils::errors::{CredentialError, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Relational layer for the local tier. Pure persistence: no encryption,
/// no external calls — the services above own those.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

// Row shapes mirror the table columns; JSON-valued and enum-valued columns
// come back as TEXT and are parsed during conversion.

#[derive(sqlx::FromRow)]
struct CredentialTypeRow {
    id: String,
    name: String,
    description: Option<String>,
    schema_version: String,
    schema_definition: String,
    issuer_pattern: Option<String>,
    required_fields: String,
    optional_fields: String,
    validation_rules: Option<String>,
    is_active: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: String,
    user_address: String,
    credential_type_id: String,
    issuer_address: String,
    issuer_name: Option<String>,
    credential_data: Option<String>,
    credential_hash: String,
    proof_signature: Option<String>,
    status: String,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: Option<String>,
    storage_type: String,
    blob_hash: Option<String>,
    chain_block_ref: Option<String>,
    chain_extrinsic_ref: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    id: String,
    credential_id: String,
    shared_with_address: String,
    shared_by_address: String,
    permissions: String,
    access_level: String,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: String,
    credential_id: String,
    verifier_address: String,
    verification_type: String,
    verification_data: Option<String>,
    status: String,
    verified_at: DateTime<Utc>,
    notes: Option<String>,
}

#[derive(sqlx::FromRow)]
struct IssuanceRequestRow {
    id: String,
    requester_address: String,
    issuer_address: String,
    credential_type_id: String,
    request_data: String,
    status: String,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    issued_credential_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RevocationRow {
    id: String,
    credential_id: String,
    revoked_by_address: String,
    reason: Option<String>,
    revoked_at: DateTime<Utc>,
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

// One bind site for the credential INSERT, shared by the plain insert and
// the issuance transaction.
fn credential_insert_query(c: &Credential) -> Result<SqliteQuery<'_>> {
    Ok(sqlx::query(
        "INSERT INTO credentials \
         (id, user_address, credential_type_id, issuer_address, issuer_name, \
          credential_data, credential_hash, proof_signature, status, issued_at, \
          expires_at, created_at, updated_at, metadata, storage_type, blob_hash, \
          chain_block_ref, chain_extrinsic_ref) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&c.id)
    .bind(&c.user_address)
    .bind(&c.credential_type_id)
    .bind(&c.issuer_address)
    .bind(&c.issuer_name)
    .bind(&c.credential_data)
    .bind(&c.credential_hash)
    .bind(&c.proof_signature)
    .bind(c.status.as_str())
    .bind(c.issued_at)
    .bind(c.expires_at)
    .bind(c.created_at)
    .bind(c.updated_at)
    .bind(c.metadata.as_ref().map(serde_json::to_string).transpose()?)
    .bind(c.storage_type.as_str())
    .bind(&c.blob_hash)
    .bind(&c.chain_block_ref)
    .bind(&c.chain_extrinsic_ref))
}

fn parse_json(s: &str) -> Result<serde_json::Value> {
    serde_json::from_str(s).map_err(|e| CredentialError::Database(format!("corrupt JSON column: {}", e)))
}

fn parse_opt_json(s: Option<String>) -> Result<Option<serde_json::Value>> {
    s.as_deref().map(parse_json).transpose()
}

fn parse_string_list(s: &str) -> Result<Vec<String>> {
    serde_json::from_str(s).map_err(|e| CredentialError::Database(format!("corrupt list column: {}", e)))
}

impl TryFrom<CredentialTypeRow> for CredentialType {
    type Error = CredentialError;

    fn try_from(row: CredentialTypeRow) -> Result<Self> {
        Ok(CredentialType {
            schema_definition: parse_json(&row.schema_definition)?,
            required_fields: parse_string_list(&row.required_fields)?,
            optional_fields: parse_string_list(&row.optional_fields)?,
            validation_rules: parse_opt_json(row.validation_rules)?,
            id: row.id,
            name: row.name,
            description: row.description,
            schema_version: row.schema_version,
            issuer_pattern: row.issuer_pattern,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<CredentialRow> for Credential {
    type Error = CredentialError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        let status = CredentialStatus::parse(&row.status)
            .ok_or_else(|| CredentialError::Database(format!("unknown credential status '{}'", row.status)))?;
        let storage_type = StorageType::parse(&row.storage_type)
            .ok_or_else(|| CredentialError::Database(format!("unknown storage type '{}'", row.storage_type)))?;
        Ok(Credential {
            metadata: parse_opt_json(row.metadata)?,
            status,
            storage_type,
            id: row.id,
            user_address: row.user_address,
            credential_type_id: row.credential_type_id,
            issuer_address: row.issuer_address,
            issuer_name: row.issuer_name,
            credential_data: row.credential_data,
            credential_hash: row.credential_hash,
            proof_signature: row.proof_signature,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            blob_hash: row.blob_hash,
            chain_block_ref: row.chain_block_ref,
            chain_extrinsic_ref: row.chain_extrinsic_ref,
        })
    }
}

impl TryFrom<ShareRow> for CredentialShare {
    type Error = CredentialError;

    fn try_from(row: ShareRow) -> Result<Self> {
        Ok(CredentialShare {
            permissions: parse_string_list(&row.permissions)?,
            id: row.id,
            credential_id: row.credential_id,
            shared_with_address: row.shared_with_address,
            shared_by_address: row.shared_by_address,
            access_level: row.access_level,
            expires_at: row.expires_at,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<VerificationRow> for CredentialVerification {
    type Error = CredentialError;

    fn try_from(row: VerificationRow) -> Result<Self> {
        Ok(CredentialVerification {
            verification_data: parse_opt_json(row.verification_data)?,
            id: row.id,
            credential_id: row.credential_id,
            verifier_address: row.verifier_address,
            verification_type: row.verification_type,
            status: row.status,
            verified_at: row.verified_at,
            notes: row.notes,
        })
    }
}

impl TryFrom<IssuanceRequestRow> for IssuanceRequest {
    type Error = CredentialError;

    fn try_from(row: IssuanceRequestRow) -> Result<Self> {
        let status = IssuanceStatus::parse(&row.status)
            .ok_or_else(|| CredentialError::Database(format!("unknown issuance status '{}'", row.status)))?;
        Ok(IssuanceRequest {
            request_data: parse_json(&row.request_data)?,
            status,
            id: row.id,
            requester_address: row.requester_address,
            issuer_address: row.issuer_address,
            credential_type_id: row.credential_type_id,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
            rejection_reason: row.rejection_reason,
            issued_credential_id: row.issued_credential_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

impl From<RevocationRow> for CredentialRevocation {
    fn from(row: RevocationRow) -> Self {
        CredentialRevocation {
            id: row.id,
            credential_id: row.credential_id,
            revoked_by_address: row.revoked_by_address,
            reason: row.reason,
            revoked_at: row.revoked_at,
        }
    }
}

impl CredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Credential types

    pub async fn insert_credential_type(&self, ct: &CredentialType) -> Result<()> {
        sqlx::query(
            "INSERT INTO credential_types \
             (id, name, description, schema_version, schema_definition, issuer_pattern, \
              required_fields, optional_fields, validation_rules, is_active, created_by, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&ct.id)
        .bind(&ct.name)
        .bind(&ct.description)
        .bind(&ct.schema_version)
        .bind(serde_json::to_string(&ct.schema_definition)?)
        .bind(&ct.issuer_pattern)
        .bind(serde_json::to_string(&ct.required_fields)?)
        .bind(serde_json::to_string(&ct.optional_fields)?)
        .bind(ct.validation_rules.as_ref().map(serde_json::to_string).transpose()?)
        .bind(ct.is_active)
        .bind(&ct.created_by)
        .bind(ct.created_at)
        .bind(ct.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_credential_type(&self, id: &str) -> Result<Option<CredentialType>> {
        let row: Option<CredentialTypeRow> =
            sqlx::query_as("SELECT * FROM credential_types WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_credential_types(&self, active_only: bool) -> Result<Vec<CredentialType>> {
        let rows: Vec<CredentialTypeRow> = if active_only {
            sqlx::query_as("SELECT * FROM credential_types WHERE is_active = 1 ORDER BY name")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT * FROM credential_types ORDER BY name")
                .fetch_all(&self.pool)
                .await?
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn set_credential_type_active(&self, id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE credential_types SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(format!("credential type {}", id)));
        }
        Ok(())
    }

    // Credentials

    pub async fn insert_credential(&self, c: &Credential) -> Result<()> {
        credential_insert_query(c)?.execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a newly issued credential and mark its originating request as
    /// issued, atomically: neither row lands without the other.
    pub async fn insert_issued_credential(&self, c: &Credential, request_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        credential_insert_query(c)?.execute(&mut *tx).await?;
        sqlx::query(
            "UPDATE issuance_requests SET status = 'issued', approved_at = ?, \
             issued_credential_id = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(&c.id)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_credential(&self, id: &str) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = sqlx::query_as("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn get_user_credentials(&self, user_address: &str) -> Result<Vec<Credential>> {
        let rows: Vec<CredentialRow> =
            sqlx::query_as("SELECT * FROM credentials WHERE user_address = ? ORDER BY issued_at DESC")
                .bind(user_address)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn get_issuer_credentials(&self, issuer_address: &str) -> Result<Vec<Credential>> {
        let rows: Vec<CredentialRow> =
            sqlx::query_as("SELECT * FROM credentials WHERE issuer_address = ? ORDER BY issued_at DESC")
                .bind(issuer_address)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Rewrite the tier bookkeeping after a write, migration or anchor.
    pub async fn update_storage_refs(
        &self,
        id: &str,
        storage_type: StorageType,
        blob_hash: Option<&str>,
        chain_block_ref: Option<&str>,
        chain_extrinsic_ref: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credentials SET storage_type = ?, blob_hash = ?, chain_block_ref = ?, \
             chain_extrinsic_ref = ?, updated_at = ? WHERE id = ?",
        )
        .bind(storage_type.as_str())
        .bind(blob_hash)
        .bind(chain_block_ref)
        .bind(chain_extrinsic_ref)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(format!("credential {}", id)));
        }
        Ok(())
    }

    pub async fn update_chain_refs(
        &self,
        id: &str,
        chain_block_ref: Option<&str>,
        chain_extrinsic_ref: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE credentials SET chain_block_ref = ?, chain_extrinsic_ref = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(chain_block_ref)
        .bind(chain_extrinsic_ref)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(format!("credential {}", id)));
        }
        Ok(())
    }

    // Shares

    pub async fn insert_share(&self, s: &CredentialShare) -> Result<()> {
        sqlx::query(
            "INSERT INTO credential_shares \
             (id, credential_id, shared_with_address, shared_by_address, permissions, \
              access_level, expires_at, is_active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&s.id)
        .bind(&s.credential_id)
        .bind(&s.shared_with_address)
        .bind(&s.shared_by_address)
        .bind(serde_json::to_string(&s.permissions)?)
        .bind(&s.access_level)
        .bind(s.expires_at)
        .bind(s.is_active)
        .bind(s.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_share(&self, id: &str) -> Result<Option<CredentialShare>> {
        let row: Option<ShareRow> = sqlx::query_as("SELECT * FROM credential_shares WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Active, unexpired shares granted to an address.
    pub async fn get_shares_for(&self, grantee: &str) -> Result<Vec<CredentialShare>> {
        let rows: Vec<ShareRow> = sqlx::query_as(
            "SELECT * FROM credential_shares \
             WHERE shared_with_address = ? AND is_active = 1 \
               AND (expires_at IS NULL OR expires_at > ?) \
             ORDER BY created_at DESC",
        )
        .bind(grantee)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn deactivate_share(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE credential_shares SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(format!("share {}", id)));
        }
        Ok(())
    }

    // Verifications

    pub async fn insert_verification(&self, v: &CredentialVerification) -> Result<()> {
        sqlx::query(
            "INSERT INTO credential_verifications \
             (id, credential_id, verifier_address, verification_type, verification_data, \
              status, verified_at, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&v.id)
        .bind(&v.credential_id)
        .bind(&v.verifier_address)
        .bind(&v.verification_type)
        .bind(v.verification_data.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&v.status)
        .bind(v.verified_at)
        .bind(&v.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_verifications(&self, credential_id: &str) -> Result<Vec<CredentialVerification>> {
        let rows: Vec<VerificationRow> = sqlx::query_as(
            "SELECT * FROM credential_verifications WHERE credential_id = ? ORDER BY verified_at DESC",
        )
        .bind(credential_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // Issuance requests

    pub async fn insert_issuance_request(&self, r: &IssuanceRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO issuance_requests \
             (id, requester_address, issuer_address, credential_type_id, request_data, \
              status, approved_at, rejected_at, rejection_reason, issued_credential_id, \
              expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&r.id)
        .bind(&r.requester_address)
        .bind(&r.issuer_address)
        .bind(&r.credential_type_id)
        .bind(serde_json::to_string(&r.request_data)?)
        .bind(r.status.as_str())
        .bind(r.approved_at)
        .bind(r.rejected_at)
        .bind(&r.rejection_reason)
        .bind(&r.issued_credential_id)
        .bind(r.expires_at)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_issuance_request(&self, id: &str) -> Result<Option<IssuanceRequest>> {
        let row: Option<IssuanceRequestRow> =
            sqlx::query_as("SELECT * FROM issuance_requests WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_issuance_requests_for(&self, issuer_address: &str) -> Result<Vec<IssuanceRequest>> {
        let rows: Vec<IssuanceRequestRow> = sqlx::query_as(
            "SELECT * FROM issuance_requests WHERE issuer_address = ? ORDER BY created_at DESC",
        )
        .bind(issuer_address)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn mark_request_rejected(&self, id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE issuance_requests SET status = 'rejected', rejected_at = ?, \
             rejection_reason = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Revocations

    /// Flip the credential to revoked and write its 1:1 revocation record
    /// in one transaction; neither change lands without the other.
    pub async fn revoke_credential(&self, r: &CredentialRevocation) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE credentials SET status = 'revoked', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&r.credential_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound(format!("credential {}", r.credential_id)));
        }

        sqlx::query(
            "INSERT INTO credential_revocations \
             (id, credential_id, revoked_by_address, reason, revoked_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&r.id)
        .bind(&r.credential_id)
        .bind(&r.revoked_by_address)
        .bind(&r.reason)
        .bind(r.revoked_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_revocation(&self, credential_id: &str) -> Result<Option<CredentialRevocation>> {
        let row: Option<RevocationRow> =
            sqlx::query_as("SELECT * FROM credential_revocations WHERE credential_id = ?")
                .bind(credential_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    // Expiry sweep

    /// Expire every active record whose deadline has passed. Each statement
    /// is a single guarded UPDATE, so the sweep is idempotent and concurrent
    /// reads never observe a partial state.
    pub async fn cleanup_expired(&self) -> Result<(u64, u64, u64)> {
        let now = Utc::now();

        let credentials = sqlx::query(
            "UPDATE credentials SET status = 'expired', updated_at = ? \
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let shares = sqlx::query(
            "UPDATE credential_shares SET is_active = 0 \
             WHERE is_active = 1 AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let requests = sqlx::query(
            "UPDATE issuance_requests SET status = 'expired' \
             WHERE status = 'pending' AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((credentials, shares, requests))
    }

    // Stats

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COALESCE(SUM(storage_type = 'local'), 0), \
                    COALESCE(SUM(storage_type = 'blob'), 0), \
                    COALESCE(SUM(storage_type = 'hybrid'), 0), \
                    COALESCE(SUM(chain_extrinsic_ref IS NOT NULL), 0), \
                    COALESCE(SUM(blob_hash IS NOT NULL), 0) \
             FROM credentials",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StorageStats {
            total: row.0,
            local: row.1,
            blob: row.2,
            hybrid: row.3,
            chain_anchored: row.4,
            with_blob_hash: row.5,
        })
    }
}
