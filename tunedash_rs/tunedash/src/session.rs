//! The per-upload session: raw table, prepared table, and upload identity.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::dispatch::{dispatch, Dashboard};
use crate::ingest::{read_table, IngestOptions};
use crate::prepare::{prepare_table, ColumnMap, PreparedTable};
use crate::table::Table;
use crate::view::{ViewConfig, ViewRequest};
use crate::DashError;

/// Owns the uploaded data for one interaction session. Created on upload, replaced by
/// the next upload, dropped when the session ends.
#[derive(Clone, Debug)]
pub struct Session {
    source_name: String,
    fingerprint: String,
    uploaded_at: DateTime<Utc>,
    raw: Table,
    prepared: PreparedTable,
}

impl Session {
    pub fn open(
        source_name: &str,
        bytes: &[u8],
        ingest: &IngestOptions,
        columns: &ColumnMap,
    ) -> Result<Self, DashError> {
        let raw = read_table(bytes, source_name, ingest)?;
        Ok(Self::from_table(source_name, sha256_hex(bytes), raw, columns))
    }

    /// Build from an already-read table.
    pub fn from_table(
        source_name: &str,
        fingerprint: String,
        raw: Table,
        columns: &ColumnMap,
    ) -> Self {
        let prepared = prepare_table(&raw, columns);
        info!(
            "Loaded {} ({} rows, {} columns, {} numeric)",
            source_name,
            raw.len(),
            raw.columns().len(),
            prepared.numeric_columns().len()
        );
        Self {
            source_name: source_name.to_string(),
            fingerprint,
            uploaded_at: Utc::now(),
            raw,
            prepared,
        }
    }

    /// Discard the current tables and load a new upload. On error the current
    /// session is left untouched.
    pub fn replace_upload(
        &mut self,
        source_name: &str,
        bytes: &[u8],
        ingest: &IngestOptions,
    ) -> Result<(), DashError> {
        let columns = self.prepared.column_map().clone();
        *self = Self::open(source_name, bytes, ingest, &columns)?;
        Ok(())
    }

    /// Resolve the requested view and build every chart input for it.
    pub fn dashboard(&self, request: &ViewRequest, best_limit: usize) -> Dashboard {
        let view = ViewConfig::resolve(request, &self.prepared);
        dispatch(&self.prepared, &view, best_limit)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Hex SHA-256 of the uploaded bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    pub fn raw(&self) -> &Table {
        &self.raw
    }

    pub fn prepared(&self) -> &PreparedTable {
        &self.prepared
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
