use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// The literal instruction resent to the engine when a reload transition
/// fires, identical across engines and sessions.
pub const RELOAD_PROMPT: &str =
    "Your context was reloaded. Re-read any task tracker state and continue where you left off.";

#[derive(Debug, Clone)]
pub struct NudgePolicy {
    pub enabled: bool,
    pub cooldown_ms: i64,
    last_nudge_ms: Arc<Mutex<i64>>,
}

impl NudgePolicy {
    pub fn new(enabled: bool, cooldown_ms: i64) -> Self {
        Self {
            enabled,
            cooldown_ms,
            last_nudge_ms: Arc::new(Mutex::new(0)),
        }
    }

    fn mark_nudged(&self, now_ms: i64) {
        *self.last_nudge_ms.lock().unwrap_or_else(|e| e.into_inner()) = now_ms;
    }

    fn cooldown_ok(&self, now_ms: i64) -> bool {
        let last = *self.last_nudge_ms.lock().unwrap_or_else(|e| e.into_inner());
        now_ms - last >= self.cooldown_ms
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Inputs to the nudge decision for one completed turn.
#[derive(Debug, Clone, Copy)]
pub struct NudgeInputs {
    pub enabled: bool,
    pub cancelled: bool,
    pub cooldown_ok: bool,
    pub has_dots: bool,
    pub reason_ok: bool,
    pub did_work: bool,
}

impl NudgeInputs {
    pub fn should_nudge(&self) -> bool {
        self.enabled
            && !self.cancelled
            && self.cooldown_ok
            && self.has_dots
            && self.reason_ok
            && self.did_work
    }
}

/// Shells out to `dot ls --json` in `cwd` and reports whether any pending
/// tasks exist. Any spawn failure, nonzero exit, or non-JSON-array output is
/// treated as "no tasks" — the nudge policy degrades silently.
pub fn has_pending_tasks(cwd: &Path) -> bool {
    let output = match Command::new("dot").args(["ls", "--json"]).current_dir(cwd).output() {
        Ok(output) => output,
        Err(err) => {
            debug!(error = %err, "dot ls --json failed to spawn");
            return false;
        }
    };
    if !output.status.success() {
        return false;
    }
    match serde_json::from_slice::<serde_json::Value>(&output.stdout) {
        Ok(serde_json::Value::Array(items)) => !items.is_empty(),
        _ => false,
    }
}

/// Evaluates the nudge decision for a completed turn and, if it fires,
/// marks the cooldown clock. Returns whether a reload transition should run.
pub fn evaluate(policy: &NudgePolicy, cancelled: bool, reason_ok: bool, did_work: bool, cwd: &Path) -> bool {
    let now = now_ms();
    let inputs = NudgeInputs {
        enabled: policy.enabled,
        cancelled,
        cooldown_ok: policy.cooldown_ok(now),
        has_dots: has_pending_tasks(cwd),
        reason_ok,
        did_work,
    };
    let fire = inputs.should_nudge();
    if fire {
        policy.mark_nudged(now);
    }
    fire
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_nudge_requires_every_input() {
        let base = NudgeInputs {
            enabled: true,
            cancelled: false,
            cooldown_ok: true,
            has_dots: true,
            reason_ok: true,
            did_work: true,
        };
        assert!(base.should_nudge());

        assert!(!NudgeInputs { enabled: false, ..base }.should_nudge());
        assert!(!NudgeInputs { cancelled: true, ..base }.should_nudge());
        assert!(!NudgeInputs { cooldown_ok: false, ..base }.should_nudge());
        assert!(!NudgeInputs { has_dots: false, ..base }.should_nudge());
        assert!(!NudgeInputs { reason_ok: false, ..base }.should_nudge());
        assert!(!NudgeInputs { did_work: false, ..base }.should_nudge());
    }

    #[test]
    fn cooldown_blocks_immediate_repeat() {
        let policy = NudgePolicy::new(true, 10_000);
        policy.mark_nudged(now_ms());
        assert!(!policy.cooldown_ok(now_ms()));
    }

    #[test]
    fn has_pending_tasks_is_false_when_binary_missing() {
        let cwd = std::env::temp_dir();
        assert!(!has_pending_tasks(&cwd));
    }
}
