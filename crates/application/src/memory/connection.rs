use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::events::ServerEvent;
use crate::presence::{ConnectionHandle, ConnectionId, EmitError};

/// 记录所有推送事件的连接，关闭后推送失败
pub struct RecordingConnection {
    id: ConnectionId,
    events: Mutex<Vec<ServerEvent>>,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 指定名称的事件，按推送顺序
    pub fn events_named(&self, name: &str) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.event == name)
            .collect()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event).collect()
    }
}

impl ConnectionHandle for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn emit(&self, event: &ServerEvent) -> Result<(), EmitError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EmitError::Closed);
        }
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}
