mod chat_lifecycle;
mod friendship_signaling;
mod message_delivery;
mod proximity;
mod read_receipts;

#[cfg(test)]
mod friendship_signaling_tests;
#[cfg(test)]
mod message_delivery_tests;
#[cfg(test)]
mod read_receipts_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use chat_lifecycle::{ChatLifecycleManager, DeletionReport};
pub use friendship_signaling::{FriendshipNotice, FriendshipSignal, FriendshipSignaling};
pub use message_delivery::{
    DeliveryResult, InvalidationPayload, MessageDelivery, MessageDeliveryDependencies,
    MessagePayload, ReplyContext, SendMessageRequest,
};
pub use proximity::{
    PositionNotice, ProximityDependencies, ProximityEngine, ShakeMatchNotice, ShakeOutcome,
};
pub use read_receipts::{
    MessageReadNotice, ReadReceipt, ReadReceiptBroadcaster, ReadReceiptReport, ReceiptDelivery,
};
