//! 好友信令单元测试

use std::sync::Arc;

use config::FriendshipConfig;
use domain::{
    FriendshipStatus, MockFriendshipRepository, MockUserRepository, RepositoryError, UserId,
    UserProfile,
};

use crate::error::ApplicationError;
use crate::events::outbound;
use crate::memory::RecordingConnection;
use crate::presence::{NotifyOutcome, PresenceRegistry};
use crate::services::friendship_signaling::FriendshipSignaling;
use crate::services::test_support::Harness;

#[tokio::test]
async fn request_persists_then_notifies_counterpart() {
    let h = Harness::new();
    let bob = h.connect(2);

    let signal = h
        .deps
        .friendships
        .request_friend(UserId(1), UserId(2))
        .await
        .unwrap();

    assert_eq!(signal.counterpart, UserId(2));
    assert_eq!(signal.notified, Some(NotifyOutcome::Delivered));

    let stored = h.storage.friendships();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].follower_id, UserId(1));
    assert_eq!(stored[0].status, FriendshipStatus::Pending);

    let events = bob.events_named(outbound::FRIEND_REQUEST_RECEIVED);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["userId"], serde_json::json!(1));
    assert_eq!(events[0].data["userName"], serde_json::json!("Alice"));
}

#[tokio::test]
async fn duplicate_request_still_notifies_by_default() {
    let h = Harness::new();
    let bob = h.connect(2);
    let signals = &h.deps.friendships;

    signals.request_friend(UserId(1), UserId(2)).await.unwrap();
    let second = signals.request_friend(UserId(1), UserId(2)).await.unwrap();

    assert_eq!(second.notified, Some(NotifyOutcome::Delivered));
    assert_eq!(h.storage.friendships().len(), 1);
    assert_eq!(bob.events_named(outbound::FRIEND_REQUEST_RECEIVED).len(), 2);
}

#[tokio::test]
async fn duplicate_request_can_be_silenced() {
    let h = Harness::with_config(
        Default::default(),
        FriendshipConfig {
            notify_duplicate_requests: false,
        },
    );
    let bob = h.connect(2);
    let signals = &h.deps.friendships;

    signals.request_friend(UserId(1), UserId(2)).await.unwrap();
    let second = signals.request_friend(UserId(1), UserId(2)).await.unwrap();

    assert_eq!(second.notified, None);
    assert_eq!(bob.events_named(outbound::FRIEND_REQUEST_RECEIVED).len(), 1);
}

#[tokio::test]
async fn accept_confirms_pending_request() {
    let h = Harness::new();
    let alice = h.connect(1);
    let signals = &h.deps.friendships;

    signals.request_friend(UserId(1), UserId(2)).await.unwrap();
    let signal = signals.accept_friend(UserId(2), UserId(1)).await.unwrap();

    assert_eq!(signal.notified, Some(NotifyOutcome::Delivered));
    assert_eq!(h.storage.friendships()[0].status, FriendshipStatus::Confirmed);

    let events = alice.events_named(outbound::FRIEND_REQUEST_ACCEPTED);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["userId"], serde_json::json!(2));
}

#[tokio::test]
async fn accept_without_pending_request_is_not_found() {
    let h = Harness::new();
    let alice = h.connect(1);

    let err = h
        .deps
        .friendships
        .accept_friend(UserId(2), UserId(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplicationError::NotFound { .. }));
    assert!(alice.events().is_empty());
}

#[tokio::test]
async fn cancel_removes_pending_and_notifies() {
    let h = Harness::new();
    let bob = h.connect(2);
    let signals = &h.deps.friendships;

    signals.request_friend(UserId(1), UserId(2)).await.unwrap();
    let signal = signals.cancel_outgoing(UserId(1), UserId(2)).await.unwrap();

    assert_eq!(signal.notified, Some(NotifyOutcome::Delivered));
    assert!(h.storage.friendships().is_empty());
    assert_eq!(bob.events_named(outbound::FRIEND_REQUEST_CANCELLED).len(), 1);
}

#[tokio::test]
async fn self_and_unknown_targets_are_rejected() {
    let h = Harness::new();
    let signals = &h.deps.friendships;

    let err = signals.request_friend(UserId(1), UserId(1)).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION");

    let err = signals.request_friend(UserId(1), UserId(77)).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(h.storage.friendships().is_empty());
}

#[tokio::test]
async fn persistence_failure_aborts_before_notification() {
    let presence = Arc::new(PresenceRegistry::new());
    let bob = RecordingConnection::new();
    presence.register(UserId(2), bob.clone());

    let mut users = MockUserRepository::new();
    users
        .expect_find_profile()
        .returning(|id| Ok(Some(UserProfile::new(id, None))));

    let mut friendships = MockFriendshipRepository::new();
    friendships.expect_find_between().returning(|_, _| Ok(None));
    friendships
        .expect_create_pending()
        .times(1)
        .returning(|_, _| Err(RepositoryError::storage("timeout")));

    let signals = FriendshipSignaling::new(
        Arc::new(friendships),
        Arc::new(users),
        presence,
        FriendshipConfig::default(),
    );

    let err = signals.request_friend(UserId(1), UserId(2)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSIENT");
    assert!(bob.events().is_empty());
}

#[tokio::test]
async fn requester_lookup_failure_writes_nothing() {
    let presence = Arc::new(PresenceRegistry::new());
    let bob = RecordingConnection::new();
    presence.register(UserId(2), bob.clone());

    let mut users = MockUserRepository::new();
    users.expect_find_profile().returning(|id| {
        if id == UserId(1) {
            Err(RepositoryError::storage("users offline"))
        } else {
            Ok(Some(UserProfile::new(id, Some("Bob".to_string()))))
        }
    });

    let mut friendships = MockFriendshipRepository::new();
    friendships.expect_find_between().returning(|_, _| Ok(None));
    friendships.expect_create_pending().never();
    friendships.expect_confirm().never();
    friendships.expect_remove_pending().never();

    let signals = FriendshipSignaling::new(
        Arc::new(friendships),
        Arc::new(users),
        presence,
        FriendshipConfig::default(),
    );

    let err = signals.request_friend(UserId(1), UserId(2)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSIENT");
    let err = signals.accept_friend(UserId(1), UserId(2)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSIENT");
    let err = signals.cancel_outgoing(UserId(1), UserId(2)).await.unwrap_err();
    assert_eq!(err.code(), "TRANSIENT");
    assert!(bob.events().is_empty());
}
