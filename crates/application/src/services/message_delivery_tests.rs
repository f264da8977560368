//! 消息投递单元测试
//!
//! 覆盖会话惰性创建、软删除恢复、附件与回复解析、回执与通知的顺序。

use std::sync::Arc;

use domain::{
    ChatPair, DeleteFor, DeleteScope, FileId, MessageId, MockFileRepository,
    MockMessageRepository, MockUserRepository, RepositoryError, StoredFile, UserId, UserProfile,
};
use uuid::Uuid;

use crate::clock::SystemClock;
use crate::events::outbound;
use crate::memory::{InMemoryStorage, RecordingConnection};
use crate::presence::{NotifyOutcome, PresenceRegistry};
use crate::services::chat_lifecycle::ChatLifecycleManager;
use crate::services::message_delivery::{
    MessageDelivery, MessageDeliveryDependencies, SendMessageRequest,
};
use crate::services::test_support::Harness;

fn request(sender: i64, recipient: i64, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        sender_id: UserId(sender),
        recipient_id: UserId(recipient),
        content: content.to_string(),
        reply_id: None,
        file_ids: Vec::new(),
    }
}

fn named_users() -> MockUserRepository {
    let mut users = MockUserRepository::new();
    users
        .expect_find_profile()
        .returning(|id| Ok(Some(UserProfile::new(id, Some(format!("u{}", id.0))))));
    users
}

fn stored_file(name: &str) -> StoredFile {
    StoredFile {
        id: FileId(Uuid::new_v4()),
        owner_id: UserId(1),
        name: name.to_string(),
        mime_type: "image/png".to_string(),
        size: 1024,
    }
}

#[tokio::test]
async fn first_message_creates_chat_and_notifies_recipient() {
    let h = Harness::new();
    let alice = h.connect(1);
    let bob = h.connect(2);

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(1, 2, "hi"))
        .await
        .unwrap();

    let chats = h.storage.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(result.message.chat_id, chats[0].id);
    assert_eq!(result.recipient, NotifyOutcome::Delivered);

    let messages = h.storage.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].read_at.is_none());

    let acks = alice.events_named(outbound::MESSAGE_SENT);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].data["success"], serde_json::json!(true));
    assert_eq!(acks[0].data["data"]["chatId"], serde_json::json!(chats[0].id.0));

    let received = bob.events_named(outbound::MESSAGE_RECEIVED);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data["content"], serde_json::json!("hi"));
    assert_eq!(received[0].data["senderName"], serde_json::json!("Alice"));
}

#[tokio::test]
async fn offline_recipient_is_reported_not_failed() {
    let h = Harness::new();
    let alice = h.connect(1);

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(1, 2, "are you there?"))
        .await
        .unwrap();

    assert_eq!(result.recipient, NotifyOutcome::RecipientOffline);
    assert_eq!(alice.event_names(), vec![outbound::MESSAGE_SENT.to_string()]);
    assert_eq!(h.storage.messages().len(), 1);
}

#[tokio::test]
async fn recipient_disconnect_mid_emit_is_swallowed() {
    let h = Harness::new();
    let alice = h.connect(1);
    let bob = h.connect(2);
    bob.close();

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(1, 2, "hi"))
        .await
        .unwrap();

    assert_eq!(result.recipient, NotifyOutcome::RecipientOffline);
    assert_eq!(h.storage.messages().len(), 1);
}

#[tokio::test]
async fn new_message_recovers_chat_hidden_by_one_side() {
    let h = Harness::new();
    let alice = h.connect(1);
    let chat_id = h.deps.lifecycle.get_or_create(UserId(1), UserId(2)).await.unwrap();
    h.deps
        .lifecycle
        .delete_for_user(&[chat_id], UserId(1), DeleteScope::OnlyMe)
        .await
        .unwrap();

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(2, 1, "come back"))
        .await
        .unwrap();

    assert_eq!(result.message.chat_id, chat_id);
    assert_eq!(h.storage.chats()[0].delete_for, DeleteFor::new());
}

#[tokio::test]
async fn chat_deleted_for_everyone_is_not_recovered() {
    let h = Harness::new();
    let alice = h.connect(1);
    let chat_id = h.deps.lifecycle.get_or_create(UserId(1), UserId(2)).await.unwrap();
    h.deps
        .lifecycle
        .delete_for_user(&[chat_id], UserId(2), DeleteScope::Everyone)
        .await
        .unwrap();

    h.deps
        .delivery
        .send_message(alice.as_ref(), request(1, 2, "still here"))
        .await
        .unwrap();

    assert_eq!(h.storage.chats()[0].delete_for, DeleteFor::everyone());
}

#[tokio::test]
async fn unknown_files_are_dropped_and_order_kept() {
    let h = Harness::new();
    let alice = h.connect(1);
    let first = stored_file("a.png");
    let second = stored_file("b.png");
    h.storage.add_file(first.clone());
    h.storage.add_file(second.clone());

    let mut req = request(1, 2, "");
    req.file_ids = vec![second.id, FileId(Uuid::new_v4()), first.id];

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), req)
        .await
        .unwrap();

    assert_eq!(result.message.files, vec![second.clone(), first.clone()]);
    assert_eq!(h.storage.messages()[0].file_ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn empty_text_without_attachments_is_rejected() {
    let h = Harness::new();
    let alice = h.connect(1);

    let err = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(1, 2, "   "))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION");
    assert!(h.storage.chats().is_empty());
    assert!(alice.events().is_empty());
}

#[tokio::test]
async fn reply_context_carries_author_name() {
    let h = Harness::new();
    let alice = h.connect(1);
    let bob = h.connect(2);

    let original = h
        .deps
        .delivery
        .send_message(bob.as_ref(), request(2, 1, "lunch?"))
        .await
        .unwrap();

    let mut req = request(1, 2, "sure");
    req.reply_id = Some(original.message.id);
    let reply = h
        .deps
        .delivery
        .send_message(alice.as_ref(), req)
        .await
        .unwrap();

    let context = reply.message.reply.expect("reply context");
    assert_eq!(context.message_id, original.message.id);
    assert_eq!(context.author_id, UserId(2));
    assert_eq!(context.author_name, "Bob");
    assert_eq!(context.content.as_str(), "lunch?");
}

#[tokio::test]
async fn reply_from_another_chat_is_dropped() {
    let h = Harness::new();
    let alice = h.connect(1);
    let carol = h.connect(3);

    let elsewhere = h
        .deps
        .delivery
        .send_message(carol.as_ref(), request(3, 4, "other chat"))
        .await
        .unwrap();

    let mut req = request(1, 2, "hello");
    req.reply_id = Some(elsewhere.message.id);
    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), req)
        .await
        .unwrap();

    assert!(result.message.reply.is_none());
    let stored = h
        .storage
        .messages()
        .into_iter()
        .find(|m| m.id == result.message.id)
        .unwrap();
    assert_eq!(stored.reply_id, None);

    let mut req = request(1, 2, "dangling");
    req.reply_id = Some(MessageId(9_999));
    assert!(h
        .deps
        .delivery
        .send_message(alice.as_ref(), req)
        .await
        .unwrap()
        .message
        .reply
        .is_none());
}

#[tokio::test]
async fn self_messaging_is_allowed() {
    let h = Harness::new();
    let alice = h.connect(1);

    let result = h
        .deps
        .delivery
        .send_message(alice.as_ref(), request(1, 1, "note to self"))
        .await
        .unwrap();

    assert_eq!(h.storage.chats()[0].pair(), ChatPair::new(UserId(1), UserId(1)));
    assert_eq!(result.recipient, NotifyOutcome::Delivered);
    assert_eq!(
        alice.event_names(),
        vec![
            outbound::MESSAGE_SENT.to_string(),
            outbound::MESSAGE_RECEIVED.to_string()
        ]
    );
}

#[tokio::test]
async fn persistence_failure_emits_nothing() {
    let storage = Arc::new(InMemoryStorage::new());
    let presence = Arc::new(PresenceRegistry::new());
    let clock = Arc::new(SystemClock);

    let mut messages = MockMessageRepository::new();
    messages
        .expect_create()
        .returning(|_| Err(RepositoryError::storage("disk full")));
    let messages = Arc::new(messages);
    let lifecycle = Arc::new(ChatLifecycleManager::new(
        storage.clone(),
        messages.clone(),
        clock.clone(),
    ));

    let delivery = MessageDelivery::new(MessageDeliveryDependencies {
        lifecycle,
        message_repository: messages,
        file_repository: Arc::new(MockFileRepository::new()),
        user_repository: Arc::new(named_users()),
        presence: presence.clone(),
        clock,
    });

    let alice = RecordingConnection::new();
    let bob = RecordingConnection::new();
    presence.register(UserId(1), alice.clone());
    presence.register(UserId(2), bob.clone());

    let err = delivery
        .send_message(alice.as_ref(), request(1, 2, "lost"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TRANSIENT");
    assert!(alice.events().is_empty());
    assert!(bob.events().is_empty());
}

#[tokio::test]
async fn sender_lookup_failure_stores_nothing() {
    let storage = Arc::new(InMemoryStorage::new());
    let presence = Arc::new(PresenceRegistry::new());
    let clock = Arc::new(SystemClock);

    let mut users = MockUserRepository::new();
    users
        .expect_find_profile()
        .returning(|_| Err(RepositoryError::storage("users offline")));

    let lifecycle = Arc::new(ChatLifecycleManager::new(
        storage.clone(),
        storage.clone(),
        clock.clone(),
    ));
    let delivery = MessageDelivery::new(MessageDeliveryDependencies {
        lifecycle,
        message_repository: storage.clone(),
        file_repository: storage.clone(),
        user_repository: Arc::new(users),
        presence: presence.clone(),
        clock,
    });

    let alice = RecordingConnection::new();
    let bob = RecordingConnection::new();
    presence.register(UserId(1), alice.clone());
    presence.register(UserId(2), bob.clone());

    let err = delivery
        .send_message(alice.as_ref(), request(1, 2, "hello"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "TRANSIENT");
    assert!(storage.messages().is_empty());
    assert!(storage.chats().is_empty());
    assert!(alice.events().is_empty());
    assert!(bob.events().is_empty());
}

#[tokio::test]
async fn invalidation_events_reach_online_recipient() {
    let h = Harness::new();
    let bob = h.connect(2);
    let chat_id = h.deps.lifecycle.get_or_create(UserId(1), UserId(2)).await.unwrap();

    let outcome = h.deps.delivery.invalidate_messages(UserId(1), UserId(2), chat_id);
    assert!(outcome.is_delivered());
    assert_eq!(
        h.deps.delivery.invalidate_chats(UserId(1), UserId(3)),
        NotifyOutcome::RecipientOffline
    );

    let events = bob.events_named(outbound::MESSAGES_LIST_INVALIDATED);
    assert_eq!(events[0].data["chatId"], serde_json::json!(chat_id.0));
    assert_eq!(events[0].data["userId"], serde_json::json!(1));
}
