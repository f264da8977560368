use std::sync::Arc;

use application::EventDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self { dispatcher }
    }
}
