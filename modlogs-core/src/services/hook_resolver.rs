// File: modlogs-core/src/services/hook_resolver.rs

use std::sync::Arc;

use modlogs_common::models::HookTarget;
use modlogs_common::traits::HookRepository;

use crate::Error;

/// Maps a streamer to every destination that should hear about its events.
#[derive(Clone)]
pub struct HookResolver {
    hooks: Arc<dyn HookRepository>,
}

impl HookResolver {
    pub fn new(hooks: Arc<dyn HookRepository>) -> Self {
        Self { hooks }
    }

    pub async fn resolve(&self, streamer_id: &str) -> Result<Vec<HookTarget>, Error> {
        let hooks = self.hooks.list_for_streamer(streamer_id).await?;
        Ok(hooks.iter().map(|h| h.target()).collect())
    }
}
