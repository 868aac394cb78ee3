//! One dispatch cycle driven by a line of input.

use std::future::Future;

use serde::Serialize;

use actuate_core::{Action, Result};
use actuate_runtime::{ActionOrchestrator, ActionResult};

/// Printed once per dispatched action.
#[derive(Debug, Serialize)]
pub struct CycleLine {
    pub cycle: u64,
    pub label: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "elapsedMs")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleLine {
    fn from_result(cycle: u64, result: ActionResult) -> Self {
        match result {
            Ok(outcome) => Self {
                cycle,
                label: outcome.label,
                ok: true,
                input: Some(outcome.input),
                elapsed_ms: Some(outcome.elapsed_ms),
                error: None,
            },
            Err(e) => Self {
                cycle,
                label: e.label().to_string(),
                ok: false,
                input: None,
                elapsed_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Parse a batch: either a JSON array of actions or a single action object.
pub fn parse_batch(line: &str) -> Result<Vec<Action>> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

/// Dispatch one batch and wait for all of it.
pub async fn run_cycle(orch: &mut ActionOrchestrator, actions: Vec<Action>) -> Vec<CycleLine> {
    orch.promise(actions).await;
    let cycle = orch.cycle();
    let (completed, pending) = orch.flush().await;

    let mut lines: Vec<CycleLine> = completed
        .into_iter()
        .map(|result| CycleLine::from_result(cycle, result))
        .collect();
    for pending in pending {
        lines.push(CycleLine {
            cycle,
            label: pending.label().to_string(),
            ok: false,
            input: None,
            elapsed_ms: None,
            error: Some("still pending".into()),
        });
    }
    lines
}

/// Like [`run_cycle`], but gives up as soon as `shutdown` resolves.
///
/// A stalled cycle (hung connector, dependency cycle) would otherwise never
/// return. Returns `None` when interrupted; the cycle's tasks are left running.
pub async fn run_cycle_until<F>(
    orch: &mut ActionOrchestrator,
    actions: Vec<Action>,
    shutdown: F,
) -> Option<Vec<CycleLine>>
where
    F: Future,
{
    tokio::select! {
        lines = run_cycle(orch, actions) => Some(lines),
        _ = shutdown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actuate_core::RuntimeConfig;
    use actuate_plugins::{load_actions, PluginContext};

    #[test]
    fn test_parse_batch_forms() {
        let batch = parse_batch(r#"[{"type": "speak", "value": "hi"}, {"type": "turn left"}]"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], Action::new("turn left", ""));

        let single = parse_batch(r#"{"type": "stand still"}"#).unwrap();
        assert_eq!(single, vec![Action::new("stand still", "")]);

        assert!(parse_batch("not json").is_err());
        assert!(parse_batch(r#"[{"value": "no type"}]"#).is_err());
    }

    #[tokio::test]
    async fn test_run_cycle_reports_each_action() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "action_execution_mode": "dependencies",
                "action_dependencies": {"speak": ["move"]},
                "agent_actions": [
                    {"label": "move", "connector": "move"},
                    {"label": "speak", "connector": "speak"}
                ]
            }"#,
        )
        .unwrap();
        let ctx = PluginContext::new();
        let registry = load_actions(&config, &ctx).unwrap();
        let mut orch = ActionOrchestrator::new(&config, registry).unwrap();

        let batch = parse_batch(
            r#"[{"type": "turn left"}, {"type": "speak", "value": ""}, {"type": "levitate"}]"#,
        )
        .unwrap();
        let lines = run_cycle(&mut orch, batch).await;

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ok);
        assert_eq!(lines[0].label, "move");
        assert_eq!(lines[0].cycle, 1);
        assert!(!lines[1].ok);
        assert!(lines[1].error.as_deref().unwrap().contains("empty sentence"));
        assert_eq!(ctx.motion.current().action, "turn left");
    }

    #[tokio::test]
    async fn test_stalled_cycle_yields_to_shutdown() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "action_execution_mode": "dependencies",
                "action_dependencies": {"speak": ["move"], "move": ["speak"]},
                "agent_actions": [
                    {"label": "move", "connector": "move"},
                    {"label": "speak", "connector": "speak"}
                ]
            }"#,
        )
        .unwrap();
        let ctx = PluginContext::new();
        let mut orch = ActionOrchestrator::new(&config, load_actions(&config, &ctx).unwrap()).unwrap();

        let batch = parse_batch(r#"[{"type": "turn left"}, {"type": "speak", "value": "hi"}]"#).unwrap();
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_cycle_until(&mut orch, batch, shutdown),
        )
        .await
        .expect("shutdown did not interrupt the stalled cycle");

        assert!(result.is_none());
        assert!(ctx.utterances.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_finishes_before_shutdown() {
        let config = RuntimeConfig::from_json_str(
            r#"{"agent_actions": [{"label": "speak", "connector": "speak"}]}"#,
        )
        .unwrap();
        let ctx = PluginContext::new();
        let mut orch = ActionOrchestrator::new(&config, load_actions(&config, &ctx).unwrap()).unwrap();

        let lines = run_cycle_until(
            &mut orch,
            parse_batch(r#"{"type": "speak", "value": "hello"}"#).unwrap(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ok);
    }
}
