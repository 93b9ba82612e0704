// modlogs-core/src/repositories/postgres/users.rs

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use modlogs_common::error::Error;
use modlogs_common::models::TwitchUser;
use modlogs_common::traits::UserRepository;

#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: Pool<Postgres>,
}

impl PostgresUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_user(r: &PgRow) -> Result<TwitchUser, Error> {
    Ok(TwitchUser {
        id:           r.try_get("id")?,
        login:        r.try_get("login")?,
        display_name: r.try_get("display_name")?,
    })
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn upsert_user(&self, user: &TwitchUser) -> Result<(), Error> {
        // A login can move to another account after a rename; the old holder
        // loses it first so the unique index never blocks the upsert.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM twitch_users WHERE login = $1 AND id <> $2")
            .bind(&user.login)
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;

        let q = r#"
            INSERT INTO twitch_users (id, login, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id)
            DO UPDATE SET login = EXCLUDED.login,
                          display_name = EXCLUDED.display_name,
                          updated_at = now()
        "#;
        sqlx::query(q)
            .bind(&user.id)
            .bind(&user.login)
            .bind(&user.display_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<TwitchUser>, Error> {
        let row = sqlx::query("SELECT id, login, display_name FROM twitch_users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_id_or_login(&self, needle: &str) -> Result<Option<TwitchUser>, Error> {
        let q = r#"
            SELECT id, login, display_name
            FROM twitch_users
            WHERE id = $1 OR login = LOWER($1)
            LIMIT 1
        "#;
        let row = sqlx::query(q)
            .bind(needle)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<TwitchUser>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT id, login, display_name FROM twitch_users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_user).collect()
    }
}
