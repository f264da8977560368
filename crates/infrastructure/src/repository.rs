use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::{
    Chat, ChatId, ChatPair, ChatRepository, DeleteFor, FileId, FileRepository, Friendship,
    FriendshipRepository, FriendshipStatus, Message, MessageContent, MessageId,
    MessageRepository, NewMessage, RepositoryError, RepositoryResult, ShakeEvent,
    ShakeRepository, StoredFile, Timestamp, UserId, UserProfile, UserRepository,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::conflict(db_err.message().to_string());
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct ChatRecord {
    id: i64,
    first_user: i64,
    second_user: i64,
    delete_for: Vec<i64>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ChatRecord> for Chat {
    fn from(value: ChatRecord) -> Self {
        Chat {
            id: ChatId(value.id),
            participant_a: UserId(value.first_user),
            participant_b: UserId(value.second_user),
            delete_for: DeleteFor::from_raw(&value.delete_for),
            created_at: value.created_at,
            deleted_at: value.deleted_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    chat_id: i64,
    sender_id: i64,
    content: String,
    reply_id: Option<i64>,
    file_ids: Vec<Uuid>,
    send_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
    delete_for: Vec<i64>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        // 带附件的消息允许正文为空
        let content = MessageContent::with_attachments(value.content)
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Message {
            id: MessageId(value.id),
            chat_id: ChatId(value.chat_id),
            sender_id: UserId(value.sender_id),
            content,
            reply_id: value.reply_id.map(MessageId),
            file_ids: value.file_ids.into_iter().map(FileId).collect(),
            send_at: value.send_at,
            read_at: value.read_at,
            delete_for: DeleteFor::from_raw(&value.delete_for),
        })
    }
}

#[derive(Debug, FromRow)]
struct FriendshipRecord {
    follower_id: i64,
    followed_id: i64,
    status: String,
}

impl TryFrom<FriendshipRecord> for Friendship {
    type Error = RepositoryError;

    fn try_from(value: FriendshipRecord) -> Result<Self, Self::Error> {
        let status = FriendshipStatus::parse(&value.status)
            .ok_or_else(|| invalid_data(format!("unknown friendship status: {}", value.status)))?;

        Ok(Friendship {
            follower_id: UserId(value.follower_id),
            followed_id: UserId(value.followed_id),
            status,
        })
    }
}

#[derive(Debug, FromRow)]
struct FileRecord {
    id: Uuid,
    owner_id: i64,
    name: String,
    mime_type: String,
    size: i64,
}

impl From<FileRecord> for StoredFile {
    fn from(value: FileRecord) -> Self {
        StoredFile {
            id: FileId(value.id),
            owner_id: UserId(value.owner_id),
            name: value.name,
            mime_type: value.mime_type,
            size: value.size,
        }
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    name: Option<String>,
}

#[derive(Debug, FromRow)]
struct ShakeRecord {
    user_a: i64,
    user_b: i64,
    created_at: DateTime<Utc>,
}

impl From<ShakeRecord> for ShakeEvent {
    fn from(value: ShakeRecord) -> Self {
        ShakeEvent::new(UserId(value.user_a), UserId(value.user_b), value.created_at)
    }
}

const CHAT_COLUMNS: &str = "id, first_user, second_user, delete_for, created_at, deleted_at";
const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, content, reply_id, file_ids, send_at, read_at, delete_for";
const FRIEND_COLUMNS: &str = "follower_id, followed_id, status";

#[derive(Clone)]
pub struct PgChatRepository {
    pool: PgPool,
}

impl PgChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn find_by_pair(&self, pair: ChatPair) -> RepositoryResult<Option<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats \
             WHERE LEAST(first_user, second_user) = $1 \
               AND GREATEST(first_user, second_user) = $2"
        );
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(pair.low().0)
            .bind(pair.high().0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(record.map(Chat::from))
    }

    async fn find_by_ids(&self, ids: &[ChatId]) -> RepositoryResult<Vec<Chat>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ANY($1)");
        let records = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(&raw)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Chat::from).collect())
    }

    async fn create(&self, pair: ChatPair, now: Timestamp) -> RepositoryResult<Chat> {
        let sql = format!(
            "INSERT INTO chats (first_user, second_user, created_at) \
             VALUES ($1, $2, $3) RETURNING {CHAT_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(pair.low().0)
            .bind(pair.high().0)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn update_delete_for(
        &self,
        id: ChatId,
        delete_for: DeleteFor,
        deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE chats SET delete_for = $2, deleted_at = $3 WHERE id = $1")
            .bind(id.0)
            .bind(delete_for.to_raw())
            .bind(deleted_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_for_user(&self, user: UserId) -> RepositoryResult<Vec<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats \
             WHERE first_user = $1 OR second_user = $1 ORDER BY id"
        );
        let records = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(user.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(Chat::from).collect())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message> {
        let file_ids: Vec<Uuid> = message.file_ids.iter().map(|id| id.0).collect();
        let sql = format!(
            "INSERT INTO messages (chat_id, sender_id, content, reply_id, file_ids, send_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message.chat_id.0)
            .bind(message.sender_id.0)
            .bind(message.content.as_str())
            .bind(message.reply_id.map(|id| id.0))
            .bind(&file_ids)
            .bind(message.send_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> RepositoryResult<Vec<Message>> {
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = chat_ids.iter().map(|id| id.0).collect();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE chat_id = ANY($1) ORDER BY send_at ASC, id ASC"
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(&raw)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }

    async fn update_delete_for(
        &self,
        id: MessageId,
        delete_for: DeleteFor,
        deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()> {
        let result =
            sqlx::query("UPDATE messages SET delete_for = $2, deleted_at = $3 WHERE id = $1")
                .bind(id.0)
                .bind(delete_for.to_raw())
                .bind(deleted_at)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_read(&self, id: MessageId, read_at: Timestamp) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE messages SET read_at = $2 WHERE id = $1")
            .bind(id.0)
            .bind(read_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgFriendshipRepository {
    pool: PgPool,
}

impl PgFriendshipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FriendshipRepository for PgFriendshipRepository {
    async fn find_between(&self, a: UserId, b: UserId) -> RepositoryResult<Option<Friendship>> {
        let sql = format!(
            "SELECT {FRIEND_COLUMNS} FROM friends \
             WHERE (follower_id = $1 AND followed_id = $2) \
                OR (follower_id = $2 AND followed_id = $1) \
             LIMIT 1"
        );
        let record = sqlx::query_as::<_, FriendshipRecord>(&sql)
            .bind(a.0)
            .bind(b.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Friendship::try_from).transpose()
    }

    async fn create_pending(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> RepositoryResult<Friendship> {
        // 任一方向已有记录时不插入，唯一索引按无序对生效
        let sql = format!(
            "INSERT INTO friends (follower_id, followed_id, status) \
             VALUES ($1, $2, 'pending') \
             ON CONFLICT DO NOTHING RETURNING {FRIEND_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, FriendshipRecord>(&sql)
            .bind(follower.0)
            .bind(followed.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        match inserted {
            Some(record) => Friendship::try_from(record),
            None => self
                .find_between(follower, followed)
                .await?
                .ok_or(RepositoryError::NotFound),
        }
    }

    async fn confirm(&self, follower: UserId, followed: UserId) -> RepositoryResult<Friendship> {
        let sql = format!(
            "UPDATE friends SET status = 'confirmed' \
             WHERE follower_id = $1 AND followed_id = $2 AND status = 'pending' \
             RETURNING {FRIEND_COLUMNS}"
        );
        let record = sqlx::query_as::<_, FriendshipRecord>(&sql)
            .bind(follower.0)
            .bind(followed.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        Friendship::try_from(record)
    }

    async fn remove_pending(&self, follower: UserId, followed: UserId) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "DELETE FROM friends \
             WHERE follower_id = $1 AND followed_id = $2 AND status = 'pending'",
        )
        .bind(follower.0)
        .bind(followed.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_confirmed(&self, user: UserId) -> RepositoryResult<Vec<UserId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT CASE WHEN follower_id = $1 THEN followed_id ELSE follower_id END \
             FROM friends \
             WHERE status = 'confirmed' AND (follower_id = $1 OR followed_id = $1)",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ids.into_iter().map(UserId).collect())
    }
}

#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn find_many(&self, ids: &[FileId]) -> RepositoryResult<Vec<StoredFile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let records = sqlx::query_as::<_, FileRecord>(
            "SELECT id, owner_id, name, mime_type, size FROM files WHERE id = ANY($1)",
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(StoredFile::from).collect())
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_profile(&self, id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT id, name FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(record.map(|r| UserProfile::new(UserId(r.id), r.name)))
    }
}

#[derive(Clone)]
pub struct PgShakeRepository {
    pool: PgPool,
}

impl PgShakeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShakeRepository for PgShakeRepository {
    async fn latest_for_pair(&self, pair: ChatPair) -> RepositoryResult<Option<ShakeEvent>> {
        let record = sqlx::query_as::<_, ShakeRecord>(
            "SELECT user_a, user_b, created_at FROM shakes \
             WHERE LEAST(user_a, user_b) = $1 AND GREATEST(user_a, user_b) = $2 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(pair.low().0)
        .bind(pair.high().0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(ShakeEvent::from))
    }

    async fn create(&self, event: ShakeEvent, cooldown: Duration) -> RepositoryResult<ShakeEvent> {
        let pair = event.pair();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 同一用户对的并发写入在事务内串行化，锁随事务结束释放
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("shake:{}:{}", pair.low(), pair.high()))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, ShakeRecord>(
            "INSERT INTO shakes (user_a, user_b, created_at) \
             SELECT $1, $2, $3 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM shakes \
                 WHERE LEAST(user_a, user_b) = $4 AND GREATEST(user_a, user_b) = $5 \
                   AND created_at > $6 \
             ) \
             RETURNING user_a, user_b, created_at",
        )
        .bind(event.user_a.0)
        .bind(event.user_b.0)
        .bind(event.created_at)
        .bind(pair.low().0)
        .bind(pair.high().0)
        .bind(event.created_at - cooldown)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(record.into()),
            None => Err(RepositoryError::conflict(format!(
                "shake for pair ({}, {}) is cooling down",
                pair.low(),
                pair.high()
            ))),
        }
    }
}

/// 共享同一连接池的全部 PostgreSQL 仓储
#[derive(Clone)]
pub struct PgStorage {
    pub chat_repository: Arc<PgChatRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub friendship_repository: Arc<PgFriendshipRepository>,
    pub file_repository: Arc<PgFileRepository>,
    pub user_repository: Arc<PgUserRepository>,
    pub shake_repository: Arc<PgShakeRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            chat_repository: Arc::new(PgChatRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            friendship_repository: Arc::new(PgFriendshipRepository::new(pool.clone())),
            file_repository: Arc::new(PgFileRepository::new(pool.clone())),
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            shake_repository: Arc::new(PgShakeRepository::new(pool)),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
