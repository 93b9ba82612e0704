// File: modlogs-core/src/cache/redis_store.rs

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::info;

use modlogs_common::error::Error;
use modlogs_common::models::{ModerationAction, WebhookSecret};
use modlogs_common::traits::{CacheStore, ClaimOutcome};

use super::keys;

const DECR_AND_DROP: &str = r#"
    local value = redis.call("DECRBY", KEYS[1], ARGV[1])
    if value <= 0 then
        redis.call("DEL", KEYS[1])
    end
    return value
"#;

const SCAN_BATCH: usize = 200;

const CONSUME_CODE: &str = r#"
    local value = redis.call("GET", KEYS[1])
    if value then
        redis.call("DEL", KEYS[1])
    end
    return value
"#;

/// Redis-backed cache/lock store.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn incr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error> {
        let mut con = self.conn();
        let value: i64 = con.incr(keys::streamer_hooks(streamer_id), by).await?;
        Ok(value)
    }

    async fn decr_streamer_hooks(&self, streamer_id: &str, by: i64) -> Result<i64, Error> {
        let mut con = self.conn();
        let value: i64 = redis::Script::new(DECR_AND_DROP)
            .key(keys::streamer_hooks(streamer_id))
            .arg(by)
            .invoke_async(&mut con)
            .await?;
        Ok(value)
    }

    async fn set_streamer_hooks(&self, streamer_id: &str, count: i64) -> Result<(), Error> {
        let mut con = self.conn();
        let key = keys::streamer_hooks(streamer_id);
        if count <= 0 {
            con.del::<_, ()>(key).await?;
        } else {
            con.set::<_, _, ()>(key, count).await?;
        }
        Ok(())
    }

    async fn get_streamer_hooks(&self, streamer_id: &str) -> Result<i64, Error> {
        let mut con = self.conn();
        let value: Option<i64> = con.get(keys::streamer_hooks(streamer_id)).await?;
        Ok(value.unwrap_or(0))
    }

    async fn list_counted_streamers(&self) -> Result<Vec<String>, Error> {
        let mut con = self.conn();
        let pattern = format!("{}*", keys::STREAMER_HOOKS_PREFIX);
        let mut cursor: u64 = 0;
        let mut streamers = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut con)
                .await?;
            streamers.extend(
                batch
                    .iter()
                    .filter_map(|key| keys::streamer_from_hooks_key(key))
                    .map(str::to_string),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        streamers.sort();
        streamers.dedup();
        Ok(streamers)
    }

    async fn claim_key(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome, Error> {
        let mut con = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await?;
        Ok(match reply {
            Some(_) => ClaimOutcome::Claimed,
            None => ClaimOutcome::AlreadyPresent,
        })
    }

    async fn release_key(&self, key: &str) -> Result<(), Error> {
        let mut con = self.conn();
        con.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn get_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<Option<WebhookSecret>, Error> {
        let mut con = self.conn();
        let mut fields: HashMap<String, String> =
            con.hgetall(keys::webhook_secret(action, streamer_id)).await?;
        Ok(fields.remove(keys::SECRET_FIELD).map(|secret| WebhookSecret {
            secret,
            subscription_id: fields.remove(keys::SUBSCRIPTION_FIELD).filter(|id| !id.is_empty()),
        }))
    }

    async fn put_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        secret: &str,
    ) -> Result<(), Error> {
        let mut con = self.conn();
        con.hset::<_, _, _, ()>(keys::webhook_secret(action, streamer_id), keys::SECRET_FIELD, secret)
            .await?;
        Ok(())
    }

    async fn set_subscription_id(
        &self,
        action: ModerationAction,
        streamer_id: &str,
        subscription_id: &str,
    ) -> Result<(), Error> {
        let mut con = self.conn();
        con.hset::<_, _, _, ()>(
            keys::webhook_secret(action, streamer_id),
            keys::SUBSCRIPTION_FIELD,
            subscription_id,
        )
        .await?;
        Ok(())
    }

    async fn delete_webhook_secret(
        &self,
        action: ModerationAction,
        streamer_id: &str,
    ) -> Result<(), Error> {
        let mut con = self.conn();
        con.del::<_, ()>(keys::webhook_secret(action, streamer_id)).await?;
        Ok(())
    }

    async fn add_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let mut con = self.conn();
        let added: i64 = con.sadd(keys::ignored_users(guild_id), user_id).await?;
        Ok(added > 0)
    }

    async fn remove_ignored_user(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let mut con = self.conn();
        let removed: i64 = con.srem(keys::ignored_users(guild_id), user_id).await?;
        Ok(removed > 0)
    }

    async fn is_user_ignored(&self, guild_id: &str, user_id: &str) -> Result<bool, Error> {
        let mut con = self.conn();
        let member: bool = con.sismember(keys::ignored_users(guild_id), user_id).await?;
        Ok(member)
    }

    async fn list_ignored_users(&self, guild_id: &str) -> Result<Vec<String>, Error> {
        let mut con = self.conn();
        let members: Vec<String> = con.smembers(keys::ignored_users(guild_id)).await?;
        Ok(members)
    }

    async fn store_auth_code(&self, code: &str, user_id: &str, ttl: Duration) -> Result<(), Error> {
        let mut con = self.conn();
        con.set_ex::<_, _, ()>(keys::auth_code(code), user_id, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn consume_auth_code(&self, code: &str) -> Result<Option<String>, Error> {
        let mut con = self.conn();
        let value: Option<String> = redis::Script::new(CONSUME_CODE)
            .key(keys::auth_code(code))
            .invoke_async(&mut con)
            .await?;
        Ok(value)
    }
}
