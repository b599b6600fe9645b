use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use nyx_checker::{ConditionChecker, NyxTriggerChecker};
use nyx_client::NyxClient;

use super::read_spec;

/// How a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Ready { polls: u32 },
    GaveUp { polls: u32 },
    Interrupted { polls: u32 },
}

impl WatchOutcome {
    pub fn polls(&self) -> u32 {
        match self {
            Self::Ready { polls } | Self::GaveUp { polls } | Self::Interrupted { polls } => *polls,
        }
    }
}

/// Handle `watch`: validate, then poll like a scheduler would until the
/// trigger is ready, the poll budget runs out, or Ctrl-C.
pub async fn handle(
    client: Arc<NyxClient>,
    spec: &str,
    id: String,
    interval_secs: u64,
    max_polls: Option<u32>,
) -> Result<()> {
    let specification = read_spec(spec)?;
    let checker = NyxTriggerChecker::fresh(client, specification, id).await?;
    println!("Specification is valid, watching checker {}", checker.id());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let outcome = poll_until_ready(
        &checker,
        Duration::from_secs(interval_secs.max(1)),
        max_polls,
        shutdown,
    )
    .await;
    tracing::debug!(polls = outcome.polls(), "watch finished: {outcome:?}");

    if let WatchOutcome::Interrupted { .. } = outcome {
        return Ok(());
    }

    let detail = checker.detailed_status().await;
    if !detail.is_empty() {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::Value::Object(detail))?
        );
    }
    println!("Persisted form: {}", checker.to_json());
    Ok(())
}

/// Poll `checker` every `period` until it is ready, `max_polls` is reached,
/// or `shutdown` completes. Shutdown stops the checker before returning.
pub async fn poll_until_ready<F>(
    checker: &NyxTriggerChecker,
    period: Duration,
    max_polls: Option<u32>,
    shutdown: F,
) -> WatchOutcome
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);
    let mut polls = 0u32;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping checker");
                checker.stop_checker().await;
                return WatchOutcome::Interrupted { polls };
            }
            _ = interval.tick() => {
                polls += 1;
                let ready = checker.eval().await;
                let disabled = checker.is_disabled().await;
                println!(
                    "[poll {polls}] trigger={} ready={ready} disabled={disabled}",
                    checker.trigger_id()
                );

                if ready {
                    println!("Trigger is ready.");
                    return WatchOutcome::Ready { polls };
                }
                if max_polls.is_some_and(|max| polls >= max) {
                    println!("Giving up after {polls} polls.");
                    return WatchOutcome::GaveUp { polls };
                }
            }
        }
    }
}
