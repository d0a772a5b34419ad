use std::sync::Arc;

use application::{ChatService, IdentityVerifier};

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, identity: Arc<dyn IdentityVerifier>) -> Self {
        Self { chat, identity }
    }
}
