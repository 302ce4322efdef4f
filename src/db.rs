use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::app::RetiredPlayer;

// Connection pool plus idempotent schema bootstrap. Each unit of work holds
// one pooled connection inside a transaction; dropping without commit rolls
// back.
#[derive(Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(num_connections: u32, db_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(num_connections.max(1))
            .connect(db_url)
            .await
            .context("failed to connect to the game database")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS retired_players (
                id UUID CONSTRAINT firstindex PRIMARY KEY,
                name varchar(100) NOT NULL,
                score INT NOT NULL,
                play_time_ms INT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .context("failed to create retired_players table")?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS score_play_time_idx
             ON retired_players (score DESC, play_time_ms, name)",
        )
        .execute(&pool)
        .await
        .context("failed to create retired_players index")?;

        Ok(Self { pool })
    }

    pub async fn unit_of_work(&self) -> sqlx::Result<UnitOfWork> {
        Ok(UnitOfWork {
            tx: self.pool.begin().await?,
        })
    }
}

#[derive(Debug)]
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork {
    pub fn player_repository(&mut self) -> RetiredPlayerRepo<'_> {
        RetiredPlayerRepo { tx: &mut self.tx }
    }

    pub async fn commit(self) -> sqlx::Result<()> {
        self.tx.commit().await
    }
}

#[derive(Debug)]
pub struct RetiredPlayerRepo<'a> {
    tx: &'a mut Transaction<'static, Postgres>,
}

impl RetiredPlayerRepo<'_> {
    pub async fn save(&mut self, player: &RetiredPlayer) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO retired_players (id, name, score, play_time_ms)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(player.id())
        .bind(player.name())
        .bind(player.score() as i32)
        .bind(player.play_time_ms() as i32)
        .execute(&mut **self.tx)
        .await?;
        Ok(())
    }

    pub async fn saved_retired_players(
        &mut self,
        offset: i64,
        limit: i64,
    ) -> sqlx::Result<Vec<RetiredPlayer>> {
        let rows = sqlx::query(
            "SELECT id, name, score, play_time_ms FROM retired_players
             ORDER BY score DESC, play_time_ms, name
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut **self.tx)
        .await?;

        let mut players = Vec::with_capacity(rows.len());
        for row in rows {
            players.push(RetiredPlayer::new(
                row.try_get::<Uuid, _>("id")?,
                row.try_get::<String, _>("name")?,
                row.try_get::<i32, _>("score")?.max(0) as u64,
                row.try_get::<i32, _>("play_time_ms")?.max(0) as u64,
            ));
        }
        Ok(players)
    }
}
