//! In-memory credential store
//!
//! Backs development mode and tests. Each user's live refresh generations sit
//! in one `DashMap` entry, so a rotation is a compare-and-swap under that
//! entry's shard lock. Expired generations are pruned whenever a user's entry
//! is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::auth::{PermissionSet, Principal};
use crate::store::{CredentialRecord, CredentialStore, RotationOutcome};
use crate::types::{AccessError, Result, SessionId, TeamId, UserId, VaultId};

#[derive(Default)]
pub struct MemoryStore {
    /// Credentials by lowercase email
    credentials: DashMap<String, CredentialRecord>,

    /// Grants by user
    principals: DashMap<UserId, Principal>,

    /// Live refresh generations by user, with their expiry
    sessions: DashMap<UserId, HashMap<SessionId, DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account; fails if the email is taken
    pub fn insert_user(&self, email: &str, password_hash: String) -> Result<UserId> {
        let key = email.trim().to_lowercase();
        let user_id = UserId::generate();

        match self.credentials.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AccessError::Store(format!("email already registered: {email}")))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(CredentialRecord {
                    user_id,
                    password_hash,
                });
            }
        }

        self.principals.insert(user_id, Principal::new(user_id));
        info!("Registered user {}", user_id);
        Ok(user_id)
    }

    /// Overwrite the stored set for `user_id` on `vault`
    pub fn set_vault_permissions(&self, user_id: UserId, vault: VaultId, permissions: PermissionSet) {
        self.principals
            .entry(user_id)
            .or_insert_with(|| Principal::new(user_id))
            .vault_permissions
            .insert(vault, permissions);
    }

    /// Overwrite the stored set for `user_id` on `team`
    pub fn set_team_permissions(&self, user_id: UserId, team: TeamId, permissions: PermissionSet) {
        self.principals
            .entry(user_id)
            .or_insert_with(|| Principal::new(user_id))
            .team_permissions
            .insert(team, permissions);
    }

    /// Number of unexpired refresh generations for `user_id`
    pub fn active_sessions(&self, user_id: &UserId) -> usize {
        let now = Utc::now();
        self.sessions
            .get(user_id)
            .map(|live| live.values().filter(|expires_at| **expires_at > now).count())
            .unwrap_or(0)
    }

    /// Generations held for `user_id`, expired ones included until pruned
    pub fn stored_sessions(&self, user_id: &UserId) -> usize {
        self.sessions.get(user_id).map(|live| live.len()).unwrap_or(0)
    }
}

fn prune_expired(live: &mut HashMap<SessionId, DateTime<Utc>>, now: DateTime<Utc>) {
    live.retain(|_, expires_at| *expires_at > now);
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load_principal(&self, user_id: &UserId) -> Result<Principal> {
        self.principals
            .get(user_id)
            .map(|p| p.clone())
            .ok_or_else(|| AccessError::Store(format!("unknown user {user_id}")))
    }

    async fn load_password_hash(&self, email: &str) -> Result<Option<CredentialRecord>> {
        let key = email.trim().to_lowercase();
        Ok(self.credentials.get(&key).map(|r| r.clone()))
    }

    async fn begin_session(
        &self,
        user_id: &UserId,
        session: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut live = self.sessions.entry(*user_id).or_default();
        prune_expired(&mut live, Utc::now());
        live.insert(*session, expires_at);
        Ok(())
    }

    async fn record_refresh_rotation(
        &self,
        user_id: &UserId,
        old: &SessionId,
        new: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let Some(mut live) = self.sessions.get_mut(user_id) else {
            return Ok(RotationOutcome::Conflict);
        };

        prune_expired(&mut live, Utc::now());
        if live.remove(old).is_none() {
            debug!("Rotation conflict for {}: {} is not live", user_id, old);
            return Ok(RotationOutcome::Conflict);
        }
        live.insert(*new, expires_at);
        Ok(RotationOutcome::Rotated)
    }

    async fn end_session(&self, user_id: &UserId, session: &SessionId) -> Result<()> {
        if let Some(mut live) = self.sessions.get_mut(user_id) {
            live.remove(session);
        }
        self.sessions.remove_if(user_id, |_, live| live.is_empty());
        Ok(())
    }
}
