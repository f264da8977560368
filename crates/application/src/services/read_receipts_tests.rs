//! 已读回执单元测试

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use domain::{ChatId, MessageId, MockMessageRepository, RepositoryError, UserId};

use crate::events::outbound;
use crate::memory::RecordingConnection;
use crate::presence::{NotifyOutcome, PresenceRegistry};
use crate::services::read_receipts::{ReadReceipt, ReadReceiptBroadcaster};
use crate::services::test_support::Harness;

fn receipt(message_id: MessageId, chat_id: ChatId, counterpart: i64) -> ReadReceipt {
    ReadReceipt {
        message_id,
        chat_id,
        counterpart_id: UserId(counterpart),
        read_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
    }
}

#[tokio::test]
async fn batch_is_grouped_per_counterpart() {
    let h = Harness::new();
    let bob = h.connect(2);
    let carol = h.connect(3);

    let with_bob = h.deps.lifecycle.get_or_create(UserId(1), UserId(2)).await.unwrap();
    let with_carol = h.deps.lifecycle.get_or_create(UserId(1), UserId(3)).await.unwrap();
    let b1 = h.seed_message(with_bob, 2, "b1").await;
    let c1 = h.seed_message(with_carol, 3, "c1").await;
    let b2 = h.seed_message(with_bob, 2, "b2").await;

    let report = h
        .deps
        .receipts
        .mark_read(
            UserId(1),
            vec![
                receipt(b1.id, with_bob, 2),
                receipt(c1.id, with_carol, 3),
                receipt(b2.id, with_bob, 2),
            ],
        )
        .await;

    assert_eq!(report.deliveries.len(), 2);
    assert_eq!(report.deliveries[0].counterpart, UserId(2));
    assert_eq!(report.deliveries[0].count, 2);
    assert_eq!(report.deliveries[1].counterpart, UserId(3));
    assert_eq!(report.deliveries[1].count, 1);
    assert_eq!(report.persisted, 3);
    assert!(report.failed.is_empty());

    let bob_reads: Vec<i64> = bob
        .events_named(outbound::MESSAGE_READ)
        .iter()
        .map(|e| e.data["messageId"].as_i64().unwrap())
        .collect();
    assert_eq!(bob_reads, vec![b1.id.0, b2.id.0]);

    let carol_reads = carol.events_named(outbound::MESSAGE_READ);
    assert_eq!(carol_reads.len(), 1);
    assert_eq!(carol_reads[0].data["readerId"], serde_json::json!(1));

    assert!(h.storage.messages().iter().all(|m| m.read_at.is_some()));
}

#[tokio::test]
async fn offline_counterpart_still_gets_persisted() {
    let h = Harness::new();
    let chat = h.deps.lifecycle.get_or_create(UserId(1), UserId(2)).await.unwrap();
    let message = h.seed_message(chat, 2, "hello").await;

    let report = h
        .deps
        .receipts
        .mark_read(UserId(1), vec![receipt(message.id, chat, 2)])
        .await;

    assert_eq!(report.deliveries[0].outcome, NotifyOutcome::RecipientOffline);
    assert_eq!(report.persisted, 1);
}

#[tokio::test]
async fn one_failed_update_does_not_block_others() {
    let presence = Arc::new(PresenceRegistry::new());
    let bob = RecordingConnection::new();
    presence.register(UserId(2), bob.clone());

    let mut messages = MockMessageRepository::new();
    messages
        .expect_mark_read()
        .returning(|id, _| {
            if id == MessageId(2) {
                Err(RepositoryError::storage("deadlock detected"))
            } else {
                Ok(())
            }
        });

    let broadcaster = ReadReceiptBroadcaster::new(Arc::new(messages), presence);
    let report = broadcaster
        .mark_read(
            UserId(1),
            vec![
                receipt(MessageId(1), ChatId(1), 2),
                receipt(MessageId(2), ChatId(1), 2),
                receipt(MessageId(3), ChatId(1), 2),
            ],
        )
        .await;

    // 通知先于持久化，失败的条目也已推送
    assert_eq!(bob.events_named(outbound::MESSAGE_READ).len(), 3);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.failed, vec![MessageId(2)]);
}
