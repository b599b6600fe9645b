use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use nyx_client::NyxClient;
use nyx_types::{NYX_CHECKER_TYPE, NyxError, Result, TriggerId, TriggerState};

use crate::checker::ConditionChecker;

/// How a checker comes into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerInit {
    /// New specification: validated against the service before the checker exists.
    Fresh { specification: String, id: String },
    /// Restored checker: trusted as-is, never validated. `trigger_id` may be
    /// the sentinel, e.g. when a dynamically-timed trigger was persisted
    /// before its first registration.
    Rehydrated {
        specification: String,
        id: String,
        trigger_id: TriggerId,
    },
}

/// Persisted form of a [`NyxTriggerChecker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNyxChecker {
    #[serde(rename = "type")]
    pub checker_type: String,
    pub specification: String,
    /// Trigger id in decimal string form, `"-1"` when unregistered.
    #[serde(rename = "triggerId")]
    pub trigger_id: String,
    pub id: String,
}

/// Condition checker backed by a trigger hosted on the Nyx service.
///
/// The checker registers its specification lazily on the first [`eval`],
/// then polls readiness on every evaluation. `eval` fails closed (errors read
/// as "not ready") while `is_disabled` fails open (errors read as "enabled").
///
/// [`eval`]: ConditionChecker::eval
pub struct NyxTriggerChecker {
    specification: String,
    id: String,
    trigger_id: AtomicI64,
    /// Serializes register-then-adopt against reset and stop.
    registration: Mutex<()>,
    client: Arc<NyxClient>,
}

impl NyxTriggerChecker {
    pub async fn new(client: Arc<NyxClient>, init: CheckerInit) -> Result<Self> {
        match init {
            CheckerInit::Fresh { specification, id } => {
                client.validate(&specification).await?;
                Ok(Self::build(client, specification, id, TriggerId::UNREGISTERED))
            }
            CheckerInit::Rehydrated {
                specification,
                id,
                trigger_id,
            } => Ok(Self::build(client, specification, id, trigger_id)),
        }
    }

    /// Validate `specification` and create an unregistered checker.
    pub async fn fresh(
        client: Arc<NyxClient>,
        specification: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            client,
            CheckerInit::Fresh {
                specification: specification.into(),
                id: id.into(),
            },
        )
        .await
    }

    /// Restore a checker without contacting the service.
    pub fn rehydrated(
        client: Arc<NyxClient>,
        specification: impl Into<String>,
        id: impl Into<String>,
        trigger_id: TriggerId,
    ) -> Self {
        Self::build(client, specification.into(), id.into(), trigger_id)
    }

    fn build(
        client: Arc<NyxClient>,
        specification: String,
        id: String,
        trigger_id: TriggerId,
    ) -> Self {
        Self {
            specification,
            id,
            trigger_id: AtomicI64::new(trigger_id.get()),
            registration: Mutex::new(()),
            client,
        }
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    pub fn trigger_id(&self) -> TriggerId {
        TriggerId::new(self.trigger_id.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> TriggerState {
        self.trigger_id().into()
    }

    fn set_trigger_id(&self, trigger_id: TriggerId) {
        self.trigger_id.store(trigger_id.get(), Ordering::SeqCst);
    }

    /// Detail record from the service, or an empty map when unregistered or
    /// when the lookup fails.
    pub async fn detailed_status(&self) -> Map<String, Value> {
        let trigger_id = self.trigger_id();
        if !trigger_id.is_registered() {
            tracing::warn!(
                "attempted to retrieve status for unregistered trigger of checker {}",
                self.id
            );
            return Map::new();
        }

        match self.client.trigger_detail(trigger_id).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::error!(
                    "Error while getting the detailed status for the trigger {}: {}",
                    self.id,
                    e
                );
                Map::new()
            }
        }
    }

    /// Return the registered id, registering the specification first if needed.
    async fn ensure_registered(&self) -> Result<TriggerId> {
        let current = self.trigger_id();
        if current.is_registered() {
            return Ok(current);
        }

        let _guard = self.registration.lock().await;
        // Another evaluation may have registered while we waited.
        let current = self.trigger_id();
        if current.is_registered() {
            return Ok(current);
        }

        let registered = self.client.register(&self.specification).await?;
        self.set_trigger_id(registered);
        tracing::info!(
            "trigger successfully registered with Triggering service. Id = {}",
            registered
        );
        Ok(registered)
    }

    pub fn to_persisted(&self) -> PersistedNyxChecker {
        PersistedNyxChecker {
            checker_type: NYX_CHECKER_TYPE.to_string(),
            specification: self.specification.clone(),
            trigger_id: self.trigger_id().to_string(),
            id: self.id.clone(),
        }
    }

    /// Rehydrate from the persisted form. The stored trigger id is adopted
    /// verbatim, sentinel included.
    pub fn from_persisted(client: Arc<NyxClient>, persisted: PersistedNyxChecker) -> Result<Self> {
        if persisted.checker_type != NYX_CHECKER_TYPE {
            return Err(NyxError::Serialization(format!(
                "Cannot create checker of {} from {}",
                NYX_CHECKER_TYPE, persisted.checker_type
            )));
        }
        let trigger_id = persisted.trigger_id.parse::<TriggerId>()?;
        Ok(Self::rehydrated(
            client,
            persisted.specification,
            persisted.id,
            trigger_id,
        ))
    }

    pub fn from_json(client: Arc<NyxClient>, value: &Value) -> Result<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some(NYX_CHECKER_TYPE) => {}
            other => {
                return Err(NyxError::Serialization(format!(
                    "Cannot create checker of {} from {}",
                    NYX_CHECKER_TYPE,
                    other.unwrap_or("<missing type>")
                )));
            }
        }
        let persisted: PersistedNyxChecker = serde_json::from_value(value.clone())
            .map_err(|e| NyxError::Serialization(format!("invalid {NYX_CHECKER_TYPE}: {e}")))?;
        Self::from_persisted(client, persisted)
    }
}

#[async_trait]
impl ConditionChecker for NyxTriggerChecker {
    async fn eval(&self) -> bool {
        let trigger_id = match self.ensure_registered().await {
            Ok(trigger_id) => trigger_id,
            Err(e) => {
                tracing::error!("Error while evaluating checker {}: {}", self.id, e);
                return false;
            }
        };

        match self.client.is_ready(trigger_id).await {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!("Error while evaluating checker {}: {}", self.id, e);
                false
            }
        }
    }

    async fn is_disabled(&self) -> bool {
        let trigger_id = self.trigger_id();
        if !trigger_id.is_registered() {
            // Not yet registered, so it is active.
            return false;
        }

        match self.client.is_active(trigger_id).await {
            Ok(active) => !active,
            Err(e) => {
                tracing::error!(
                    "Error while checking whether checker {} is disabled: {}",
                    self.id,
                    e
                );
                false
            }
        }
    }

    /// Unregister the trigger and drop back to unregistered, so the next
    /// evaluation registers the specification again.
    async fn reset(&self) {
        let _guard = self.registration.lock().await;
        let trigger_id = self.trigger_id();
        tracing::info!("Resetting triggerId = {}", trigger_id);
        if let Err(e) = self.client.unregister(trigger_id).await {
            tracing::error!("Error while resetting checker {}: {}", self.id, e);
        }
        self.set_trigger_id(TriggerId::UNREGISTERED);
    }

    async fn stop_checker(&self) {
        let _guard = self.registration.lock().await;
        if let Err(e) = self.client.unregister(self.trigger_id()).await {
            tracing::error!("Error while stopping checker {}: {}", self.id, e);
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn checker_type(&self) -> &'static str {
        NYX_CHECKER_TYPE
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "type": NYX_CHECKER_TYPE,
            "specification": self.specification,
            "triggerId": self.trigger_id().to_string(),
            "id": self.id,
        })
    }

    /// Nyx triggers have no schedule of their own.
    fn next_check_time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::MAX_UTC
    }
}

impl std::fmt::Debug for NyxTriggerChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NyxTriggerChecker")
            .field("id", &self.id)
            .field("specification", &self.specification)
            .field("trigger_id", &self.trigger_id())
            .finish()
    }
}

impl PartialEq for NyxTriggerChecker {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.specification == other.specification
            && self.trigger_id() == other.trigger_id()
    }
}

impl Eq for NyxTriggerChecker {}

impl Hash for NyxTriggerChecker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.specification.hash(state);
        self.trigger_id().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nyx_client::{HttpMethod::*, MockTransport, NyxServiceConfig};
    use proptest::prelude::*;
    use std::collections::HashSet;

    const SPEC: &str = r#"{"cron":"0 0 * * *"}"#;

    fn mock_client() -> (Arc<NyxClient>, Arc<MockTransport>) {
        let mock = Arc::new(MockTransport::new());
        let client = NyxClient::with_transport(NyxServiceConfig::default(), mock.clone());
        (Arc::new(client), mock)
    }

    fn offline_client() -> Arc<NyxClient> {
        mock_client().0
    }

    #[tokio::test]
    async fn test_fresh_checker_validates_and_starts_unregistered() {
        let (client, mock) = mock_client();
        mock.respond(Post, "/validate", r#"{"valid": true}"#);

        let checker = NyxTriggerChecker::fresh(client, SPEC, "chk1").await.unwrap();
        assert_eq!(checker.state(), TriggerState::Unregistered);
        assert_eq!(checker.trigger_id(), TriggerId::UNREGISTERED);
        assert_eq!(mock.count(Post, "/validate"), 1);
        assert_eq!(mock.requests()[0].body.as_deref(), Some(SPEC));
    }

    #[tokio::test]
    async fn test_fresh_checker_rejected_by_service() {
        let (client, mock) = mock_client();
        mock.respond(Post, "/validate", r#"{"valid": false, "errors": ["bad cron"]}"#);

        let err = NyxTriggerChecker::fresh(client, SPEC, "chk1").await.unwrap_err();
        assert!(matches!(err, NyxError::Validation(ref d) if d == "bad cron"));
        assert_eq!(mock.count(Post, "/register"), 0);
    }

    #[tokio::test]
    async fn test_fresh_checker_fails_when_service_unreachable() {
        let (client, mock) = mock_client();
        mock.fail(Post, "/validate", "connection refused");
        assert!(NyxTriggerChecker::fresh(client, SPEC, "chk1").await.is_err());
    }

    #[tokio::test]
    async fn test_rehydrated_checker_never_validates() {
        let (client, mock) = mock_client();
        mock.respond(Post, "/validate", r#"{"valid": false}"#);

        let checker = NyxTriggerChecker::new(
            client.clone(),
            CheckerInit::Rehydrated {
                specification: SPEC.into(),
                id: "chk1".into(),
                trigger_id: TriggerId::new(7),
            },
        )
        .await
        .unwrap();
        assert_eq!(checker.state(), TriggerState::Registered(TriggerId::new(7)));

        let unregistered =
            NyxTriggerChecker::rehydrated(client, SPEC, "chk2", TriggerId::UNREGISTERED);
        assert_eq!(unregistered.state(), TriggerState::Unregistered);
        assert_eq!(mock.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_eval_registers_once_then_polls() {
        let (client, mock) = mock_client();
        mock.respond(Post, "/validate", r#"{"valid": true}"#)
            .respond(Post, "/register", r#"{"id": 42}"#)
            .respond(Get, "/status/42", r#"{"ready": false}"#)
            .respond(Get, "/status/42", r#"{"ready": true}"#);

        let checker = NyxTriggerChecker::fresh(client, SPEC, "chk1").await.unwrap();
        assert_eq!(checker.trigger_id(), TriggerId::UNREGISTERED);

        assert!(!checker.eval().await);
        assert_eq!(checker.trigger_id(), TriggerId::new(42));

        assert!(checker.eval().await);
        assert!(checker.eval().await);
        assert_eq!(mock.count(Post, "/register"), 1);
        assert_eq!(mock.count(Get, "/status/42"), 3);
    }

    #[tokio::test]
    async fn test_eval_absorbs_registration_failure() {
        let (client, mock) = mock_client();
        mock.respond(Post, "/register", r#"{"error": "quota exceeded"}"#)
            .respond(Post, "/register", r#"{"id": 5}"#);
        mock.respond(Get, "/status/5", r#"{"ready": true}"#);

        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::UNREGISTERED);
        assert!(!checker.eval().await);
        assert_eq!(checker.state(), TriggerState::Unregistered);
        assert_eq!(mock.count(Get, "/status/5"), 0);

        assert!(checker.eval().await);
        assert_eq!(checker.trigger_id(), TriggerId::new(5));
        assert_eq!(mock.count(Post, "/register"), 2);
    }

    #[tokio::test]
    async fn test_eval_absorbs_status_failure() {
        let (client, mock) = mock_client();
        mock.fail(Get, "/status/9", "timed out");

        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(9));
        assert!(!checker.eval().await);
        assert_eq!(checker.trigger_id(), TriggerId::new(9));
        assert_eq!(mock.count(Post, "/register"), 0);
    }

    #[tokio::test]
    async fn test_eval_treats_error_reply_as_not_ready() {
        let (client, mock) = mock_client();
        mock.respond(Get, "/status/9", r#"{"ready": true, "error": "stale"}"#);
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(9));
        assert!(!checker.eval().await);
    }

    #[tokio::test]
    async fn test_is_disabled_unregistered_makes_no_calls() {
        let (client, mock) = mock_client();
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::UNREGISTERED);
        assert!(!checker.is_disabled().await);
        assert_eq!(mock.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_is_disabled_follows_active_flag() {
        let (client, mock) = mock_client();
        mock.respond(Get, "/status/3", r#"{"ready": false, "active": true}"#)
            .respond(Get, "/status/3", r#"{"ready": false, "active": false}"#);
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(3));
        assert!(!checker.is_disabled().await);
        assert!(checker.is_disabled().await);
    }

    #[tokio::test]
    async fn test_is_disabled_fails_open() {
        let (client, mock) = mock_client();
        mock.fail(Get, "/status/3", "connection reset")
            .respond(Get, "/status/3", r#"{"ready": false}"#);
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(3));
        assert!(!checker.is_disabled().await);
        // Missing "active" key.
        assert!(!checker.is_disabled().await);
    }

    #[tokio::test]
    async fn test_detailed_status() {
        let (client, mock) = mock_client();
        mock.respond(Get, "/trigger/3", r#"{"id": 3, "owner": "etl"}"#)
            .fail(Get, "/trigger/3", "connection reset");

        let unregistered =
            NyxTriggerChecker::rehydrated(client.clone(), SPEC, "chk0", TriggerId::UNREGISTERED);
        assert!(unregistered.detailed_status().await.is_empty());
        assert_eq!(mock.total_requests(), 0);

        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(3));
        assert_eq!(checker.detailed_status().await["owner"], "etl");
        assert!(checker.detailed_status().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_then_eval_registers_again() {
        let (client, mock) = mock_client();
        mock.respond(Delete, "/unregister/42", "{}");
        mock.respond(Post, "/register", r#"{"id": 43}"#);
        mock.respond(Get, "/status/43", r#"{"ready": false}"#);

        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(42));
        checker.reset().await;
        assert_eq!(checker.state(), TriggerState::Unregistered);
        assert_eq!(mock.count(Delete, "/unregister/42"), 1);

        assert!(!checker.eval().await);
        assert!(!checker.eval().await);
        assert_eq!(checker.trigger_id(), TriggerId::new(43));
        assert_eq!(mock.count(Post, "/register"), 1);
        let register = mock
            .requests()
            .into_iter()
            .find(|r| r.path == "/register")
            .unwrap();
        assert_eq!(register.body.as_deref(), Some(SPEC));
    }

    #[tokio::test]
    async fn test_reset_unregisters_even_when_delete_fails() {
        let (client, mock) = mock_client();
        mock.respond(Delete, "/unregister/42", r#"{"error": "storage offline"}"#);
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(42));
        checker.reset().await;
        assert_eq!(checker.state(), TriggerState::Unregistered);
    }

    #[tokio::test]
    async fn test_reset_unregistered_makes_no_calls() {
        let (client, mock) = mock_client();
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::UNREGISTERED);
        checker.reset().await;
        assert_eq!(mock.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_stop_checker_keeps_local_state() {
        let (client, mock) = mock_client();
        mock.fail(Delete, "/unregister/42", "connection refused");
        let checker = NyxTriggerChecker::rehydrated(client, SPEC, "chk1", TriggerId::new(42));
        checker.stop_checker().await;
        checker.stop_checker().await;
        assert_eq!(checker.trigger_id(), TriggerId::new(42));
        assert_eq!(mock.count(Delete, "/unregister/42"), 2);
    }

    #[test]
    fn test_to_json_shape() {
        let checker =
            NyxTriggerChecker::rehydrated(offline_client(), SPEC, "chk1", TriggerId::UNREGISTERED);
        assert_eq!(
            checker.to_json(),
            serde_json::json!({
                "type": "NyxTriggerChecker",
                "specification": SPEC,
                "triggerId": "-1",
                "id": "chk1",
            })
        );
        assert_eq!(
            serde_json::to_value(checker.to_persisted()).unwrap(),
            checker.to_json()
        );
    }

    #[test]
    fn test_from_json_rejects_other_types() {
        let err = NyxTriggerChecker::from_json(
            offline_client(),
            &serde_json::json!({
                "type": "BasicTimeChecker",
                "specification": SPEC,
                "triggerId": "3",
                "id": "chk1",
            }),
        )
        .unwrap_err();
        assert!(matches!(err, NyxError::Serialization(ref m) if m.contains("BasicTimeChecker")));

        let err = NyxTriggerChecker::from_json(offline_client(), &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, NyxError::Serialization(_)));
    }

    #[test]
    fn test_from_json_rejects_bad_trigger_id() {
        for trigger_id in [serde_json::json!("forty"), serde_json::json!(3)] {
            let value = serde_json::json!({
                "type": NYX_CHECKER_TYPE,
                "specification": SPEC,
                "triggerId": trigger_id,
                "id": "chk1",
            });
            assert!(matches!(
                NyxTriggerChecker::from_json(offline_client(), &value),
                Err(NyxError::Serialization(_))
            ));
        }
    }

    #[test]
    fn test_equality_uses_full_identity() {
        let client = offline_client();
        let a = NyxTriggerChecker::rehydrated(client.clone(), SPEC, "chk1", TriggerId::new(1));
        let b = NyxTriggerChecker::rehydrated(offline_client(), SPEC, "chk1", TriggerId::new(1));
        let c = NyxTriggerChecker::rehydrated(client.clone(), SPEC, "chk1", TriggerId::new(2));
        let d = NyxTriggerChecker::rehydrated(client.clone(), "{}", "chk1", TriggerId::new(1));
        let e = NyxTriggerChecker::rehydrated(client, SPEC, "chk2", TriggerId::new(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
        assert_eq!(
            NyxTriggerChecker::from_persisted(offline_client(), a.to_persisted()).unwrap(),
            a
        );

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_scheduler_hooks() {
        let checker =
            NyxTriggerChecker::rehydrated(offline_client(), SPEC, "chk1", TriggerId::new(1));
        let mut context = Map::new();
        context.insert("trigger".into(), Value::from("t-1"));
        checker.set_context(&context);
        assert_eq!(checker.trigger_id(), TriggerId::new(1));
        assert_eq!(checker.next_check_time(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(checker.checker_type(), "NyxTriggerChecker");
        assert_eq!(ConditionChecker::id(&checker), "chk1");
    }

    proptest! {
        #[test]
        fn test_persisted_form_survives_rehydration(
            specification in ".*",
            id in "[a-zA-Z0-9_-]{0,16}",
            raw_trigger_id in prop_oneof![Just(-1i64), any::<i64>()],
        ) {
            let checker = NyxTriggerChecker::rehydrated(
                offline_client(),
                specification.clone(),
                id.clone(),
                TriggerId::new(raw_trigger_id),
            );
            let json = checker.to_json();
            let restored = NyxTriggerChecker::from_json(offline_client(), &json).unwrap();

            prop_assert_eq!(&restored, &checker);
            prop_assert_eq!(restored.to_json(), json);
            prop_assert_eq!(restored.to_persisted().trigger_id, raw_trigger_id.to_string());
        }
    }
}
