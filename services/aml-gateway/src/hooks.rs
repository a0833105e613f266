//! Completion hook, invoked after a check reaches `Completed`

use crate::domain::Check;
use async_trait::async_trait;
use tracing::debug;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

/// Advisory notification; a failing hook never undoes the completed check
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_check_completed(&self, check: &Check) -> HookResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompletionHook;

#[async_trait]
impl CompletionHook for NoopCompletionHook {
    async fn on_check_completed(&self, check: &Check) -> HookResult {
        debug!(check_id = %check.id, "Check completed, no hook configured");
        Ok(())
    }
}
