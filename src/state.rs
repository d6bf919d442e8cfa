use crate::context::SyncContext;
use crate::lock::UserLocks;

/// Shared state for the HTTP handlers via `State<AppState>`. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub ctx: SyncContext,
    pub locks: UserLocks,
}

impl AppState {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            locks: UserLocks::new(),
        }
    }
}
