use crate::counter_pool::CounterPool;
use crate::types::{SessionKey, SessionRecord};
use cpif_core::{CpifError, Result};
use std::collections::HashMap;

/// Authoritative map of active sessions and the counter ids they hold
///
/// Every allocated counter id is held by exactly one record; dropping a record
/// always returns its id to the pool.
#[derive(Debug)]
pub struct SessionDirectory {
    sessions: HashMap<SessionKey, SessionRecord>,
    pool: CounterPool,
}

impl SessionDirectory {
    pub fn new(max_sessions: u32) -> Self {
        Self {
            sessions: HashMap::with_capacity(max_sessions as usize),
            pool: CounterPool::new(max_sessions),
        }
    }

    // Create: カウンタIDを割り当ててレコードを登録
    pub fn create(&mut self, key: SessionKey) -> Result<u32> {
        if self.sessions.contains_key(&key) {
            return Err(CpifError::SessionExists(key.ue_addr()));
        }

        let ctr_id = self.pool.allocate()?;
        self.sessions.insert(key, SessionRecord { teid: 0, ctr_id });
        Ok(ctr_id)
    }

    // Modify: 下り TEID を記録し、既存のカウンタIDを返す
    pub fn modify(&mut self, key: SessionKey, teid: u32) -> Result<u32> {
        let record = self
            .sessions
            .get_mut(&key)
            .ok_or(CpifError::SessionNotFound(key.ue_addr()))?;
        record.teid = teid;
        Ok(record.ctr_id)
    }

    // Delete: レコードを削除し、カウンタIDをプールへ返却
    pub fn delete(&mut self, key: SessionKey) -> Result<SessionRecord> {
        let record = self
            .sessions
            .remove(&key)
            .ok_or(CpifError::SessionNotFound(key.ue_addr()))?;
        self.pool.release(record.ctr_id)?;
        Ok(record)
    }

    pub fn get(&self, key: SessionKey) -> Option<&SessionRecord> {
        self.sessions.get(&key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Counter ids still available for new sessions
    pub fn free_counters(&self) -> usize {
        self.pool.available()
    }

    pub fn pool(&self) -> &CounterPool {
        &self.pool
    }
}
