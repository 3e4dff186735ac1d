//! PostgreSQL Store
//!
//! [`Store`] implementation over sqlx. Maps between the database schema and
//! the domain entities; IDs are `BIGSERIAL` columns exposed as `u64`.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres};

use crate::domain::{Event, Message, Room, Store, Transaction, User};
use crate::shared::error::AppError;

/// Database row representation of the `users` table.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, friend_ids: BTreeSet<u64>) -> User {
        let mut user = User::new(self.name);
        user.id = self.id as u64;
        user.first_name = self.first_name;
        user.last_name = self.last_name;
        user.password_hash = self.password_hash;
        user.friend_ids = friend_ids;
        user.created_at = self.created_at;
        user
    }
}

/// Database row representation of the `rooms` table.
#[derive(Debug, sqlx::FromRow)]
struct RoomRow {
    id: i64,
    name: String,
    is_talk_room: bool,
    owner_id: i64,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_room(self, member_ids: BTreeSet<u64>) -> Room {
        Room::from_parts(
            self.id as u64,
            self.name,
            self.is_talk_room,
            self.owner_id as u64,
            member_ids,
            self.created_at,
        )
    }
}

/// Database row representation of the `messages` table.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    room_id: i64,
    user_id: i64,
    content: String,
    created_at: DateTime<Utc>,
    deleted: bool,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message::from_parts(
            row.id as u64,
            row.room_id as u64,
            row.user_id as u64,
            row.content,
            row.created_at,
            row.deleted,
        )
    }
}

fn to_db_ids(ids: &[u64]) -> Vec<i64> {
    ids.iter().map(|&id| id as i64).collect()
}

/// Group `(owner, value)` pairs by owner.
fn group_pairs(pairs: Vec<(i64, i64)>) -> HashMap<u64, BTreeSet<u64>> {
    let mut grouped: HashMap<u64, BTreeSet<u64>> = HashMap::new();
    for (owner, value) in pairs {
        grouped.entry(owner as u64).or_default().insert(value as u64);
    }
    grouped
}

async fn fetch_users(conn: &mut PgConnection, ids: &[u64]) -> Result<Vec<User>, sqlx::Error> {
    let ids = to_db_ids(ids);
    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, name, first_name, last_name, password_hash, created_at
        FROM users
        WHERE id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let pairs = sqlx::query_as::<_, (i64, i64)>(
        "SELECT user_id, friend_id FROM user_friends WHERE user_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut friends = group_pairs(pairs);

    Ok(rows
        .into_iter()
        .map(|row| {
            let friend_ids = friends.remove(&(row.id as u64)).unwrap_or_default();
            row.into_user(friend_ids)
        })
        .collect())
}

async fn fetch_user(conn: &mut PgConnection, id: u64) -> Result<Option<User>, sqlx::Error> {
    Ok(fetch_users(conn, &[id]).await?.pop())
}

async fn attach_members(
    conn: &mut PgConnection,
    rows: Vec<RoomRow>,
) -> Result<Vec<Room>, sqlx::Error> {
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let pairs = sqlx::query_as::<_, (i64, i64)>(
        "SELECT room_id, user_id FROM room_members WHERE room_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut members = group_pairs(pairs);

    Ok(rows
        .into_iter()
        .map(|row| {
            let member_ids = members.remove(&(row.id as u64)).unwrap_or_default();
            row.into_room(member_ids)
        })
        .collect())
}

async fn fetch_room(conn: &mut PgConnection, id: u64) -> Result<Option<Room>, sqlx::Error> {
    let row = sqlx::query_as::<_, RoomRow>(
        "SELECT id, name, is_talk_room, owner_id, created_at FROM rooms WHERE id = $1",
    )
    .bind(id as i64)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(attach_members(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn replace_members(conn: &mut PgConnection, room: &Room) -> Result<(), sqlx::Error> {
    let member_ids: Vec<i64> = room.member_ids.iter().map(|&id| id as i64).collect();

    sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND NOT (user_id = ANY($2))")
        .bind(room.id as i64)
        .bind(&member_ids)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO room_members (room_id, user_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(room.id as i64)
    .bind(&member_ids)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// PostgreSQL store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: u64) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_user(&mut conn, id).await?)
    }

    async fn find_users(&self, ids: &[u64]) -> Result<Vec<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_users(&mut conn, ids).await?)
    }

    async fn find_room(&self, id: u64) -> Result<Option<Room>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_room(&mut conn, id).await?)
    }

    async fn find_user_rooms(&self, user_id: u64) -> Result<Vec<Room>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT r.id, r.name, r.is_talk_room, r.owner_id, r.created_at
            FROM rooms r
            INNER JOIN room_members rm ON rm.room_id = r.id
            WHERE rm.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id as i64)
        .fetch_all(&mut *conn)
        .await?;

        Ok(attach_members(&mut conn, rows).await?)
    }

    async fn find_room_messages(
        &self,
        room_id: u64,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, room_id, user_id, content, created_at, deleted
            FROM messages
            WHERE room_id = $1
              AND deleted = FALSE
              AND ($2::TIMESTAMPTZ IS NULL OR created_at < $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(room_id as i64)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn find_unread_messages(
        &self,
        room_id: u64,
        user_id: u64,
        limit: usize,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.room_id, m.user_id, m.content, m.created_at, m.deleted
            FROM messages m
            LEFT JOIN room_reads rr ON rr.room_id = m.room_id AND rr.user_id = $2
            WHERE m.room_id = $1
              AND m.deleted = FALSE
              AND m.user_id <> $2
              AND (rr.read_at IS NULL OR m.created_at > rr.read_at)
            ORDER BY m.created_at, m.id
            LIMIT $3
            "#,
        )
        .bind(room_id as i64)
        .bind(user_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn count_unread(&self, room_id: u64, user_id: u64) -> Result<u64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            LEFT JOIN room_reads rr ON rr.room_id = m.room_id AND rr.user_id = $2
            WHERE m.room_id = $1
              AND m.deleted = FALSE
              AND m.user_id <> $2
              AND (rr.read_at IS NULL OR m.created_at > rr.read_at)
            "#,
        )
        .bind(room_id as i64)
        .bind(user_id as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn soft_delete_room_messages(&self, room_id: u64) -> Result<u64, AppError> {
        let result =
            sqlx::query("UPDATE messages SET deleted = TRUE WHERE room_id = $1 AND deleted = FALSE")
                .bind(room_id as i64)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Transaction context that wraps a SQLx transaction.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn find_user(&mut self, id: u64) -> Result<Option<User>, AppError> {
        Ok(fetch_user(&mut self.tx, id).await?)
    }

    async fn find_room(&mut self, id: u64) -> Result<Option<Room>, AppError> {
        Ok(fetch_room(&mut self.tx, id).await?)
    }

    async fn insert_room(&mut self, room: &Room) -> Result<u64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rooms (name, is_talk_room, owner_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&room.name)
        .bind(room.is_talk_room)
        .bind(room.owner_id as i64)
        .bind(room.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut stored = room.clone();
        stored.id = id as u64;
        replace_members(&mut self.tx, &stored).await?;

        Ok(id as u64)
    }

    async fn update_room_members(&mut self, room: &Room) -> Result<(), AppError> {
        Ok(replace_members(&mut self.tx, room).await?)
    }

    async fn delete_room(&mut self, room_id: u64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id as i64)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_user_friends(&mut self, user: &User) -> Result<(), AppError> {
        let friend_ids: Vec<i64> = user.friend_ids.iter().map(|&id| id as i64).collect();

        sqlx::query("DELETE FROM user_friends WHERE user_id = $1 AND NOT (friend_id = ANY($2))")
            .bind(user.id as i64)
            .bind(&friend_ids)
            .execute(&mut *self.tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO user_friends (user_id, friend_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id as i64)
        .bind(&friend_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<u64, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO messages (room_id, user_id, content, created_at, deleted)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(message.room_id as i64)
        .bind(message.user_id as i64)
        .bind(&message.content)
        .bind(message.created_at)
        .bind(message.deleted)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id as u64)
    }

    async fn mark_room_read(
        &mut self,
        room_id: u64,
        user_id: u64,
        read_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO room_reads (room_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id) DO UPDATE SET read_at = EXCLUDED.read_at
            "#,
        )
        .bind(room_id as i64)
        .bind(user_id as i64)
        .bind(read_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn append_events(&mut self, events: &[Event]) -> Result<(), AppError> {
        for event in events {
            let payload = serde_json::to_value(event.payload())
                .map_err(|e| AppError::Internal(format!("Failed to encode event: {}", e)))?;
            let (stream_kind, stream_id) = event.stream().parts();

            sqlx::query(
                r#"
                INSERT INTO events (kind, stream_kind, stream_id, payload, occurs_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(event.kind().as_str())
            .bind(stream_kind)
            .bind(stream_id.map(|id| id as i64))
            .bind(payload)
            .bind(event.occurs_at())
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(AppError::Database)
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await.map_err(AppError::Database)
    }
}
