//! SQLite conversation store.
//!
//! Three tables:
//! - `users`: known callers; a conversation can only be written for one
//! - `chats`: one row per conversation, owned by exactly one user
//! - `messages`: message rows keyed by `(chat_id, display_order)`
//!
//! Every upsert runs in a single transaction that replaces the whole
//! message list, so readers only ever see a complete snapshot.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deepsearch_core::error::StoreError;
use deepsearch_core::identity::UserId;
use deepsearch_core::message::{
    Conversation, ConversationId, ConversationSummary, Message, Part, Role,
};
use deepsearch_core::store::{ConversationStore, UpsertConversation};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// SQLite-backed [`ConversationStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps sort lexicographically in time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Accepts `sqlite://path/to.db` or `sqlite::memory:`. An in-memory
    /// database is pinned to one connection so every query sees the same
    /// data.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");

        if !in_memory
            && let Some(parent) = url
                .strip_prefix("sqlite://")
                .map(std::path::Path::new)
                .and_then(|p| p.parent())
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10))
            .foreign_keys(true);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id             TEXT PRIMARY KEY NOT NULL,
                name           TEXT,
                email          TEXT,
                created_at     TEXT NOT NULL,
                last_active_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("users table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id         TEXT PRIMARY KEY NOT NULL,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chats table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                chat_id       TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                display_order INTEGER NOT NULL,
                message_id    TEXT NOT NULL,
                role          TEXT NOT NULL,
                parts         TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                PRIMARY KEY (chat_id, display_order)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chats_user_updated ON chats(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chats index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Register a user, or update name and email of an existing one.
    pub async fn create_user(
        &self,
        user_id: &UserId,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = COALESCE(excluded.name, users.name),
                email = COALESCE(excluded.email, users.email)
            "#,
        )
        .bind(user_id.as_str())
        .bind(name)
        .bind(email)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

/// Read a conversation and its messages through an open connection.
async fn fetch_conversation(
    conn: &mut SqliteConnection,
    conversation_id: &ConversationId,
    user_id: &UserId,
) -> Result<Option<Conversation>, StoreError> {
    let Some(chat) = sqlx::query(
        "SELECT id, user_id, title, created_at, updated_at FROM chats WHERE id = ? AND user_id = ?",
    )
    .bind(conversation_id.as_str())
    .bind(user_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?
    else {
        return Ok(None);
    };

    let rows = sqlx::query(
        "SELECT message_id, role, parts FROM messages WHERE chat_id = ? ORDER BY display_order ASC",
    )
    .bind(conversation_id.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;

    let messages = rows
        .iter()
        .map(row_to_message)
        .collect::<Result<Vec<_>, _>>()?;

    let summary = row_to_summary(&chat)?;
    Ok(Some(Conversation {
        id: summary.id,
        user_id: summary.user_id,
        title: summary.title,
        messages,
        created_at: summary.created_at,
        updated_at: summary.updated_at,
    }))
}

fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSummary, StoreError> {
    let get = |col: &str| -> Result<String, StoreError> {
        row.try_get::<String, _>(col)
            .map_err(|e| StoreError::Corrupt(format!("{col} column: {e}")))
    };
    Ok(ConversationSummary {
        id: ConversationId(get("id")?),
        user_id: UserId(get("user_id")?),
        title: get("title")?,
        created_at: parse_timestamp(&get("created_at")?)?,
        updated_at: parse_timestamp(&get("updated_at")?)?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
    let id: String = row
        .try_get("message_id")
        .map_err(|e| StoreError::Corrupt(format!("message_id column: {e}")))?;
    let role_raw: String = row
        .try_get("role")
        .map_err(|e| StoreError::Corrupt(format!("role column: {e}")))?;
    let parts_json: String = row
        .try_get("parts")
        .map_err(|e| StoreError::Corrupt(format!("parts column: {e}")))?;

    let role = Role::parse(&role_raw)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown role '{role_raw}'")))?;
    let raw_parts: Vec<serde_json::Value> = serde_json::from_str(&parts_json)
        .map_err(|e| StoreError::Corrupt(format!("parts of message {id}: {e}")))?;

    Ok(Message {
        id,
        role,
        parts: raw_parts.into_iter().map(Part::from_value).collect(),
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, request: UpsertConversation) -> Result<Conversation, StoreError> {
        let UpsertConversation {
            user_id,
            conversation_id,
            title,
            messages,
        } = request;
        let now = timestamp(Utc::now());

        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Writing first takes the database write lock, which serializes
        // concurrent upserts of the same conversation.
        let touched = sqlx::query("UPDATE users SET last_active_at = ? WHERE id = ?")
            .bind(&now)
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();
        if touched == 0 {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }

        let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM chats WHERE id = ?")
            .bind(conversation_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

        match owner {
            Some(owner) if owner != user_id.as_str() => {
                warn!(
                    conversation_id = %conversation_id,
                    user_id = %user_id,
                    "Rejected write to conversation owned by another user"
                );
                return Err(StoreError::OwnershipViolation);
            }
            Some(_) => {
                sqlx::query("DELETE FROM messages WHERE chat_id = ?")
                    .bind(conversation_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage)?;
                sqlx::query("UPDATE chats SET title = ?, updated_at = ? WHERE id = ?")
                    .bind(&title)
                    .bind(&now)
                    .bind(conversation_id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO chats (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(conversation_id.as_str())
                .bind(user_id.as_str())
                .bind(&title)
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            }
        }

        for (order, message) in messages.iter().enumerate() {
            let parts = serde_json::to_string(&message.parts)
                .map_err(|e| StoreError::Storage(format!("encode parts: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO messages (chat_id, display_order, message_id, role, parts, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(conversation_id.as_str())
            .bind(order as i64)
            .bind(&message.id)
            .bind(message.role.as_str())
            .bind(parts)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        let conversation = fetch_conversation(&mut tx, &conversation_id, &user_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt("conversation vanished mid-transaction".into()))?;

        tx.commit().await.map_err(storage)?;

        debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            messages = conversation.messages.len(),
            "Conversation upserted"
        );
        Ok(conversation)
    }

    async fn get(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        fetch_conversation(&mut conn, conversation_id, user_id).await
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, created_at, updated_at FROM chats
            WHERE user_id = ?
            ORDER BY updated_at DESC, created_at DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(row_to_summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepsearch_core::message::ToolInvocation;
    use serde_json::json;

    async fn store_with_users(users: &[&str]) -> SqliteStore {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        for user in users {
            store.create_user(&UserId::from(user), None, None).await.unwrap();
        }
        store
    }

    fn upsert(user: &str, chat: &str, messages: Vec<Message>) -> UpsertConversation {
        UpsertConversation {
            user_id: UserId::from(user),
            conversation_id: ConversationId::from(chat),
            title: "Weather".into(),
            messages,
        }
    }

    fn tool_message() -> Message {
        let mut inv = ToolInvocation::call("call_1", "search_web", json!({"query": "weather Paris"}), 0);
        inv.complete(json!([{"title": "t", "link": "l", "snippet": "s"}]));
        Message::assistant(vec![Part::ToolInvocation(inv), Part::text("Sunny.")])
    }

    #[tokio::test]
    async fn upsert_creates_conversation() {
        let store = store_with_users(&["alice"]).await;
        let messages = vec![Message::user("What's the weather in Paris?"), tool_message()];

        let conv = store.upsert(upsert("alice", "c1", messages.clone())).await.unwrap();

        assert_eq!(conv.id.as_str(), "c1");
        assert_eq!(conv.user_id.as_str(), "alice");
        assert_eq!(conv.messages, messages);
        assert_eq!(conv.created_at, conv.updated_at);
    }

    #[tokio::test]
    async fn upsert_replaces_all_messages() {
        let store = store_with_users(&["alice"]).await;
        let first = vec![Message::user("a"), Message::user("b"), Message::user("c")];
        let created = store.upsert(upsert("alice", "c1", first)).await.unwrap();

        let second = vec![Message::user("only")];
        let mut request = upsert("alice", "c1", second.clone());
        request.title = "Renamed".into();
        let updated = store.upsert(request).await.unwrap();

        assert_eq!(updated.messages, second);
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent() {
        let store = store_with_users(&["alice"]).await;
        let messages = vec![Message::user("q"), tool_message()];
        store.upsert(upsert("alice", "c1", messages.clone())).await.unwrap();
        store.upsert(upsert("alice", "c1", messages.clone())).await.unwrap();

        let conv = store
            .get(&ConversationId::from("c1"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.messages, messages);
    }

    #[tokio::test]
    async fn empty_message_list_is_allowed() {
        let store = store_with_users(&["alice"]).await;
        let conv = store.upsert(upsert("alice", "c1", vec![])).await.unwrap();
        assert!(conv.messages.is_empty());
    }

    #[tokio::test]
    async fn foreign_owner_is_rejected_and_untouched() {
        let store = store_with_users(&["alice", "bob"]).await;
        let original = vec![Message::user("alice's question")];
        store.upsert(upsert("alice", "c1", original.clone())).await.unwrap();

        let err = store
            .upsert(upsert("bob", "c1", vec![Message::user("hijack")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnershipViolation));
        assert!(!err.to_string().contains("alice"));

        let conv = store
            .get(&ConversationId::from("c1"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.messages, original);
    }

    #[tokio::test]
    async fn unknown_user_writes_nothing() {
        let store = store_with_users(&["alice"]).await;
        let err = store
            .upsert(upsert("mallory", "c1", vec![Message::user("x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownUser(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn failure_mid_write_rolls_back() {
        let store = store_with_users(&["alice"]).await;
        let original = vec![Message::user("keep me"), Message::user("and me")];
        store.upsert(upsert("alice", "c1", original.clone())).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER fail_system BEFORE INSERT ON messages WHEN NEW.role = 'system' \
             BEGIN SELECT RAISE(ABORT, 'boom'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store
            .upsert(upsert("alice", "c1", vec![Message::user("new"), Message::system("fails")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        let conv = store
            .get(&ConversationId::from("c1"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.messages, original);
    }

    #[tokio::test]
    async fn get_hides_other_users_conversations() {
        let store = store_with_users(&["alice", "bob"]).await;
        store.upsert(upsert("alice", "c1", vec![Message::user("x")])).await.unwrap();

        let as_bob = store
            .get(&ConversationId::from("c1"), &UserId::from("bob"))
            .await
            .unwrap();
        let missing = store
            .get(&ConversationId::from("nope"), &UserId::from("bob"))
            .await
            .unwrap();
        assert!(as_bob.is_none());
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_orders_by_most_recent_update() {
        let store = store_with_users(&["alice", "bob"]).await;
        store.upsert(upsert("alice", "old", vec![])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert(upsert("alice", "new", vec![])).await.unwrap();
        store.upsert(upsert("bob", "bobs", vec![])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert(upsert("alice", "old", vec![Message::user("bump")])).await.unwrap();

        let ids: Vec<String> = store
            .list(&UserId::from("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id.0)
            .collect();
        assert_eq!(ids, ["old", "new"]);
    }

    #[tokio::test]
    async fn legacy_rows_are_normalized_on_read() {
        let store = store_with_users(&["alice"]).await;
        store.upsert(upsert("alice", "c1", vec![])).await.unwrap();
        sqlx::query(
            "INSERT INTO messages (chat_id, display_order, message_id, role, parts, created_at) \
             VALUES ('c1', 0, 'm0', 'user', '[{\"type\":\"text\",\"content\":\"old shape\"}]', '2024-01-01T00:00:00.000000Z')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let conv = store
            .get(&ConversationId::from("c1"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.messages[0].parts, vec![Part::text("old shape")]);
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_complete_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("chats.db").display());
        let store = SqliteStore::new(&url).await.unwrap();
        store.create_user(&UserId::from("alice"), None, None).await.unwrap();

        let mut handles = Vec::new();
        for n in 1..=8usize {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let messages = (0..n).map(|i| Message::user(format!("writer {n} msg {i}"))).collect();
                store.upsert(upsert("alice", "shared", messages)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let conv = store
            .get(&ConversationId::from("shared"), &UserId::from("alice"))
            .await
            .unwrap()
            .unwrap();
        let n = conv.messages.len();
        assert!((1..=8).contains(&n));
        for (i, message) in conv.messages.iter().enumerate() {
            assert_eq!(message.text(), format!("writer {n} msg {i}"));
        }
    }
}
