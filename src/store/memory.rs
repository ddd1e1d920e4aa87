//! In-process record store
//!
//! Each conditional update runs inside a single critical section, which is this
//! backend's equivalent of a `WHERE state = ...` update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{PasswordResetRepository, RefreshTokenRepository, StoreError};
use crate::models::{PasswordResetRecord, RefreshTokenRecord};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenRepository {
    records: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<RefreshTokenRecord> {
        lock(&self.records).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_unique(
    records: &mut HashMap<Uuid, RefreshTokenRecord>,
    record: &RefreshTokenRecord,
) -> Result<(), StoreError> {
    if records.contains_key(&record.id)
        || records.values().any(|r| r.token_hash == record.token_hash)
    {
        return Err(StoreError::Duplicate(record.id.to_string()));
    }
    records.insert(record.id, record.clone());
    Ok(())
}

#[async_trait]
impl RefreshTokenRepository for MemoryRefreshTokenRepository {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        insert_unique(&mut lock(&self.records), record)
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(lock(&self.records)
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn rotate(
        &self,
        parent_id: Uuid,
        successor: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = lock(&self.records);

        match records.get(&parent_id) {
            Some(parent) if !parent.revoked && parent.expires_at > now => {}
            _ => return Ok(false),
        }

        insert_unique(&mut records, successor)?;

        if let Some(parent) = records.get_mut(&parent_id) {
            parent.revoked = true;
            parent.revoked_at = Some(now);
            parent.replaced_by = Some(successor.id);
        }
        Ok(true)
    }

    async fn revoke_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = lock(&self.records);
        let record = records
            .values_mut()
            .find(|r| r.token_hash == token_hash && !r.revoked && r.expires_at > now);

        match record {
            Some(record) => {
                record.revoked = true;
                record.revoked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_chain(&self, from_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let mut visited = HashSet::new();
        let mut revoked = 0;
        let mut next = Some(from_id);

        while let Some(id) = next {
            if !visited.insert(id) {
                break;
            }
            next = match records.get_mut(&id) {
                Some(record) => {
                    if !record.revoked {
                        record.revoked = true;
                        record.revoked_at = Some(now);
                        revoked += 1;
                    }
                    record.replaced_by
                }
                None => None,
            };
        }

        Ok(revoked)
    }

    async fn revoke_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for record in lock(&self.records)
            .values_mut()
            .filter(|r| r.subject_id == subject_id && !r.revoked)
        {
            record.revoked = true;
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        revoked_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|_, r| {
            let expired = r.expires_at < expired_before;
            let stale_revoked = r.revoked_at.map_or(false, |at| at < revoked_before);
            !(expired || stale_revoked)
        });
        Ok((before - records.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPasswordResetRepository {
    records: Mutex<HashMap<Uuid, PasswordResetRecord>>,
}

impl MemoryPasswordResetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<PasswordResetRecord> {
        lock(&self.records).get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryPasswordResetRepository {
    async fn insert(&self, record: &PasswordResetRecord) -> Result<(), StoreError> {
        let mut records = lock(&self.records);
        if records.contains_key(&record.id)
            || records.values().any(|r| r.code_hash == record.code_hash)
        {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        code_hash: &str,
    ) -> Result<Option<PasswordResetRecord>, StoreError> {
        Ok(lock(&self.records)
            .values()
            .find(|r| r.code_hash == code_hash)
            .cloned())
    }

    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        match lock(&self.records).get_mut(&id) {
            Some(record) if !record.consumed && record.expires_at > now => {
                record.consumed = true;
                record.consumed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: Uuid) -> Result<bool, StoreError> {
        match lock(&self.records).get_mut(&id) {
            Some(record) if record.consumed => {
                record.consumed = false;
                record.consumed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_all_for_subject(
        &self,
        subject_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut consumed = 0;
        for record in lock(&self.records)
            .values_mut()
            .filter(|r| r.subject_id == subject_id && !r.consumed)
        {
            record.consumed = true;
            record.consumed_at = Some(now);
            consumed += 1;
        }
        Ok(consumed)
    }

    async fn purge(&self, expired_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|_, r| r.expires_at >= expired_before);
        Ok((before - records.len()) as u64)
    }
}
