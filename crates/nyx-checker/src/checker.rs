use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Capabilities the scheduler relies on for every condition checker kind.
///
/// Lifecycle operations never fail: a checker absorbs its own errors into a
/// conservative answer so one broken condition cannot stall the scheduler.
#[async_trait]
pub trait ConditionChecker: Send + Sync + std::fmt::Debug {
    /// Whether the condition is currently met.
    async fn eval(&self) -> bool;

    /// Whether the condition has been switched off and should not be scheduled.
    async fn is_disabled(&self) -> bool;

    async fn reset(&self);

    /// Release any external resources held by the checker.
    async fn stop_checker(&self);

    fn id(&self) -> &str;

    /// Type tag used to persist and rehydrate the checker.
    fn checker_type(&self) -> &'static str;

    /// Persisted form, carrying the type tag under `"type"`.
    fn to_json(&self) -> Value;

    /// Inject scheduler context. Checkers that need none ignore it.
    fn set_context(&self, _context: &Map<String, Value>) {}

    /// Next time the scheduler should evaluate this checker.
    fn next_check_time(&self) -> DateTime<Utc>;
}
