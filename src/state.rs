use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::persistence::Persistence;
use crate::room::RoomRegistry;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub store: Arc<dyn Store>,
    pub persistence: Arc<dyn Persistence>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, persistence: Arc<dyn Persistence>, config: Config) -> Self {
        let registry = Arc::new(RoomRegistry::new(
            Arc::clone(&store),
            Arc::clone(&persistence),
            config.clone(),
        ));
        Self {
            registry,
            store,
            persistence,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
