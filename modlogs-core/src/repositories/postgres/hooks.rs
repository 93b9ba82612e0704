// modlogs-core/src/repositories/postgres/hooks.rs
//
// Hook registrations in the `hooks` table, keyed by (guild_id, channel_id, streamer_id).

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use modlogs_common::error::Error;
use modlogs_common::models::{Hook, HookMode};
use modlogs_common::traits::HookRepository;

#[derive(Clone)]
pub struct PostgresHookRepository {
    pool: Pool<Postgres>,
}

impl PostgresHookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_hook(r: &PgRow) -> Result<Hook, Error> {
    let mode: i16 = r.try_get("mode")?;
    Ok(Hook {
        guild_id:    r.try_get("guild_id")?,
        channel_id:  r.try_get("channel_id")?,
        streamer_id: r.try_get("streamer_id")?,
        mode:        HookMode::from_i16(mode),
    })
}

#[async_trait]
impl HookRepository for PostgresHookRepository {
    async fn insert_hook(&self, hook: &Hook) -> Result<bool, Error> {
        let q = r#"
            INSERT INTO hooks (guild_id, channel_id, streamer_id, mode)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (guild_id, channel_id, streamer_id) DO NOTHING
        "#;
        let res = sqlx::query(q)
            .bind(&hook.guild_id)
            .bind(&hook.channel_id)
            .bind(&hook.streamer_id)
            .bind(hook.mode.as_i16())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_mode(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
        mode: HookMode,
    ) -> Result<bool, Error> {
        let q = r#"
            UPDATE hooks
            SET mode = $4, updated_at = now()
            WHERE guild_id = $1 AND channel_id = $2 AND streamer_id = $3
        "#;
        let res = sqlx::query(q)
            .bind(guild_id)
            .bind(channel_id)
            .bind(streamer_id)
            .bind(mode.as_i16())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<Option<Hook>, Error> {
        let q = r#"
            SELECT guild_id, channel_id, streamer_id, mode
            FROM hooks
            WHERE guild_id = $1 AND channel_id = $2 AND streamer_id = $3
        "#;
        let row = sqlx::query(q)
            .bind(guild_id)
            .bind(channel_id)
            .bind(streamer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_hook).transpose()
    }

    async fn list_for_streamer(&self, streamer_id: &str) -> Result<Vec<Hook>, Error> {
        let q = r#"
            SELECT guild_id, channel_id, streamer_id, mode
            FROM hooks
            WHERE streamer_id = $1
        "#;
        let rows = sqlx::query(q)
            .bind(streamer_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_hook).collect()
    }

    async fn list_for_guild(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
    ) -> Result<Vec<Hook>, Error> {
        let q = r#"
            SELECT guild_id, channel_id, streamer_id, mode
            FROM hooks
            WHERE guild_id = $1
              AND ($2::TEXT IS NULL OR channel_id = $2)
            ORDER BY created_at
        "#;
        let rows = sqlx::query(q)
            .bind(guild_id)
            .bind(channel_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_hook).collect()
    }

    async fn count_for_guild(&self, guild_id: &str) -> Result<i64, Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM hooks WHERE guild_id = $1")
            .bind(guild_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn count_for_streamer(&self, streamer_id: &str) -> Result<i64, Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM hooks WHERE streamer_id = $1")
            .bind(streamer_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn delete_hook(
        &self,
        guild_id: &str,
        channel_id: &str,
        streamer_id: &str,
    ) -> Result<u64, Error> {
        let q = r#"
            DELETE FROM hooks
            WHERE guild_id = $1 AND channel_id = $2 AND streamer_id = $3
        "#;
        let res = sqlx::query(q)
            .bind(guild_id)
            .bind(channel_id)
            .bind(streamer_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_for_guild_streamer(
        &self,
        guild_id: &str,
        streamer_id: &str,
        channel_id: Option<&str>,
    ) -> Result<u64, Error> {
        let q = r#"
            DELETE FROM hooks
            WHERE guild_id = $1
              AND streamer_id = $2
              AND ($3::TEXT IS NULL OR channel_id = $3)
        "#;
        let res = sqlx::query(q)
            .bind(guild_id)
            .bind(streamer_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_for_streamer(&self, streamer_id: &str) -> Result<u64, Error> {
        let res = sqlx::query("DELETE FROM hooks WHERE streamer_id = $1")
            .bind(streamer_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn list_streamer_ids(&self) -> Result<Vec<String>, Error> {
        let rows = sqlx::query("SELECT DISTINCT streamer_id FROM hooks")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(r.try_get("streamer_id")?);
        }
        Ok(out)
    }
}
