use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use domain::{
    Chat, ChatId, ChatPair, ChatRepository, DeleteFor, FileId, FileRepository, Friendship,
    FriendshipRepository, FriendshipStatus, Message, MessageId, MessageRepository, NewMessage,
    RepositoryError, RepositoryResult, ShakeEvent, ShakeRepository, StoredFile, Timestamp, UserId,
    UserProfile, UserRepository,
};

#[derive(Default)]
struct State {
    next_chat_id: i64,
    next_message_id: i64,
    chats: Vec<Chat>,
    messages: Vec<Message>,
    friendships: Vec<Friendship>,
    files: HashMap<FileId, StoredFile>,
    users: HashMap<UserId, UserProfile>,
    shakes: Vec<ShakeEvent>,
}

/// 进程内的关系存储，实现全部仓储接口
///
/// 与 PostgreSQL 实现保持相同的约束：同一无序用户对只能有一个会话，
/// 重复创建返回 `Conflict`。
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, id: UserId, name: Option<&str>) {
        self.lock()
            .users
            .insert(id, UserProfile::new(id, name.map(str::to_string)));
    }

    pub fn add_file(&self, file: StoredFile) {
        self.lock().files.insert(file.id, file);
    }

    pub fn add_friendship(&self, follower: UserId, followed: UserId, status: FriendshipStatus) {
        self.lock().friendships.push(Friendship {
            follower_id: follower,
            followed_id: followed,
            status,
        });
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.lock().chats.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn friendships(&self) -> Vec<Friendship> {
        self.lock().friendships.clone()
    }

    pub fn shakes(&self) -> Vec<ShakeEvent> {
        self.lock().shakes.clone()
    }
}

#[async_trait]
impl ChatRepository for InMemoryStorage {
    async fn find_by_pair(&self, pair: ChatPair) -> RepositoryResult<Option<Chat>> {
        Ok(self.lock().chats.iter().find(|chat| chat.pair() == pair).cloned())
    }

    async fn find_by_ids(&self, ids: &[ChatId]) -> RepositoryResult<Vec<Chat>> {
        Ok(self
            .lock()
            .chats
            .iter()
            .filter(|chat| ids.contains(&chat.id))
            .cloned()
            .collect())
    }

    async fn create(&self, pair: ChatPair, now: Timestamp) -> RepositoryResult<Chat> {
        let mut state = self.lock();
        if state.chats.iter().any(|chat| chat.pair() == pair) {
            return Err(RepositoryError::conflict(format!("chat for pair {pair} exists")));
        }
        state.next_chat_id += 1;
        let chat = Chat::new(ChatId(state.next_chat_id), pair.low(), pair.high(), now);
        state.chats.push(chat.clone());
        Ok(chat)
    }

    async fn update_delete_for(
        &self,
        id: ChatId,
        delete_for: DeleteFor,
        deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()> {
        let mut state = self.lock();
        let chat = state
            .chats
            .iter_mut()
            .find(|chat| chat.id == id)
            .ok_or(RepositoryError::NotFound)?;
        chat.delete_for = delete_for;
        chat.deleted_at = deleted_at;
        Ok(())
    }

    async fn list_for_user(&self, user: UserId) -> RepositoryResult<Vec<Chat>> {
        Ok(self
            .lock()
            .chats
            .iter()
            .filter(|chat| chat.involves(user))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStorage {
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut state = self.lock();
        state.next_message_id += 1;
        let message = message.into_message(MessageId(state.next_message_id));
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        Ok(self.lock().messages.iter().find(|m| m.id == id).cloned())
    }

    async fn list_by_chats(&self, chat_ids: &[ChatId]) -> RepositoryResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .lock()
            .messages
            .iter()
            .filter(|m| chat_ids.contains(&m.chat_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.send_at.cmp(&b.send_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn update_delete_for(
        &self,
        id: MessageId,
        delete_for: DeleteFor,
        _deleted_at: Option<Timestamp>,
    ) -> RepositoryResult<()> {
        let mut state = self.lock();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::NotFound)?;
        message.delete_for = delete_for;
        Ok(())
    }

    async fn mark_read(&self, id: MessageId, read_at: Timestamp) -> RepositoryResult<()> {
        let mut state = self.lock();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::NotFound)?;
        message.read_at = Some(read_at);
        Ok(())
    }
}

#[async_trait]
impl FriendshipRepository for InMemoryStorage {
    async fn find_between(&self, a: UserId, b: UserId) -> RepositoryResult<Option<Friendship>> {
        Ok(self
            .lock()
            .friendships
            .iter()
            .find(|f| f.involves(a) && f.other(a) == Some(b))
            .cloned())
    }

    async fn create_pending(
        &self,
        follower: UserId,
        followed: UserId,
    ) -> RepositoryResult<Friendship> {
        let mut state = self.lock();
        if let Some(existing) = state
            .friendships
            .iter()
            .find(|f| f.involves(follower) && f.other(follower) == Some(followed))
        {
            return Ok(existing.clone());
        }
        let friendship = Friendship::pending(follower, followed);
        state.friendships.push(friendship.clone());
        Ok(friendship)
    }

    async fn confirm(&self, follower: UserId, followed: UserId) -> RepositoryResult<Friendship> {
        let mut state = self.lock();
        let friendship = state
            .friendships
            .iter_mut()
            .find(|f| {
                f.follower_id == follower
                    && f.followed_id == followed
                    && f.status == FriendshipStatus::Pending
            })
            .ok_or(RepositoryError::NotFound)?;
        friendship.confirm();
        Ok(friendship.clone())
    }

    async fn remove_pending(&self, follower: UserId, followed: UserId) -> RepositoryResult<bool> {
        let mut state = self.lock();
        let before = state.friendships.len();
        state.friendships.retain(|f| {
            !(f.follower_id == follower
                && f.followed_id == followed
                && f.status == FriendshipStatus::Pending)
        });
        Ok(state.friendships.len() != before)
    }

    async fn list_confirmed(&self, user: UserId) -> RepositoryResult<Vec<UserId>> {
        Ok(self
            .lock()
            .friendships
            .iter()
            .filter(|f| f.is_confirmed())
            .filter_map(|f| f.other(user))
            .collect())
    }
}

#[async_trait]
impl FileRepository for InMemoryStorage {
    async fn find_many(&self, ids: &[FileId]) -> RepositoryResult<Vec<StoredFile>> {
        let state = self.lock();
        Ok(ids.iter().filter_map(|id| state.files.get(id).cloned()).collect())
    }
}

#[async_trait]
impl UserRepository for InMemoryStorage {
    async fn find_profile(&self, id: UserId) -> RepositoryResult<Option<UserProfile>> {
        Ok(self.lock().users.get(&id).cloned())
    }
}

#[async_trait]
impl ShakeRepository for InMemoryStorage {
    async fn latest_for_pair(&self, pair: ChatPair) -> RepositoryResult<Option<ShakeEvent>> {
        Ok(self
            .lock()
            .shakes
            .iter()
            .filter(|event| event.pair() == pair)
            .max_by_key(|event| event.created_at)
            .cloned())
    }

    async fn create(&self, event: ShakeEvent, cooldown: Duration) -> RepositoryResult<ShakeEvent> {
        let mut state = self.lock();
        let pair = event.pair();
        let cooling = state.shakes.iter().any(|existing| {
            existing.pair() == pair && existing.is_cooling_down(event.created_at, cooldown)
        });
        if cooling {
            return Err(RepositoryError::conflict(format!(
                "shake for pair ({}, {}) is cooling down",
                pair.low(),
                pair.high()
            )));
        }
        state.shakes.push(event.clone());
        Ok(event)
    }
}
