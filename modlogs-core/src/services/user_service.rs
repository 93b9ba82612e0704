// File: modlogs-core/src/services/user_service.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use modlogs_common::models::TwitchUser;
use modlogs_common::traits::{TwitchApi, UserRepository};

use crate::Error;

/// Read-through cache of Twitch identities: the local table first, Helix on
/// a miss, and every Helix answer written back.
pub struct UserService {
    users: Arc<dyn UserRepository>,
    twitch: Arc<dyn TwitchApi>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, twitch: Arc<dyn TwitchApi>) -> Self {
        Self { users, twitch }
    }

    /// Looks a user up by numeric id or by login.
    pub async fn resolve(&self, needle: &str) -> Result<Option<TwitchUser>, Error> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        if let Some(user) = self.users.find_by_id_or_login(&needle).await? {
            return Ok(Some(user));
        }

        let ids: Vec<String> = if needle.chars().all(|c| c.is_ascii_digit()) {
            vec![needle.clone()]
        } else {
            Vec::new()
        };
        let fetched = self.twitch.get_users(&ids, &[needle.clone()]).await?;
        let Some(user) = fetched.into_iter().next() else {
            debug!(needle = %needle, "Twitch user not found");
            return Ok(None);
        };
        self.users.upsert_user(&user).await?;
        Ok(Some(user))
    }

    pub async fn resolve_id(&self, id: &str) -> Result<Option<TwitchUser>, Error> {
        if let Some(user) = self.users.find_by_id(id).await? {
            return Ok(Some(user));
        }
        let fetched = self.twitch.get_users(&[id.to_string()], &[]).await?;
        let Some(user) = fetched.into_iter().next() else {
            return Ok(None);
        };
        self.users.upsert_user(&user).await?;
        Ok(Some(user))
    }

    /// Resolves every id it can, in the order given. Ids Twitch no longer
    /// knows are skipped.
    pub async fn resolve_many(&self, ids: &[String]) -> Result<Vec<TwitchUser>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut known: HashMap<String, TwitchUser> = self
            .users
            .find_many(ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !known.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            for user in self.twitch.get_users(&missing, &[]).await? {
                if let Err(e) = self.users.upsert_user(&user).await {
                    warn!(user = %user.id, error = %e, "Failed to cache Twitch user");
                }
                known.insert(user.id.clone(), user);
            }
        }

        Ok(ids.iter().filter_map(|id| known.remove(id)).collect())
    }
}
