use std::sync::Arc;

use application::{ChatService, RoomBus, RoomRegistry};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub bus: Arc<dyn RoomBus>,
    pub registry: Arc<RoomRegistry>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        bus: Arc<dyn RoomBus>,
        registry: Arc<RoomRegistry>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            chat_service,
            bus,
            registry,
            jwt_service,
        }
    }
}
