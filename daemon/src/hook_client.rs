use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use anyhow::{bail, Context};
use banjo_protocol::hook::{HookDecision, HookRequest, HookResponse};
use serde::Deserialize;
use serde_json::json;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// What Claude Code's `PreToolUse` hook actually sends on stdin — a superset
/// of `HookRequest`'s fields, since the hook runner adds transcript/cwd
/// bookkeeping we don't need.
#[derive(Debug, Deserialize)]
struct PreToolUseInput {
    session_id: String,
    tool_name: String,
    #[serde(default)]
    tool_input: serde_json::Value,
    #[serde(default)]
    tool_use_id: Option<String>,
}

/// Entry point for `banjo hook permission`: reads one `PreToolUseInput` JSON
/// object from stdin, forwards it to the daemon over
/// `BANJO_PERMISSION_SOCKET`, and prints the decision back in the shape
/// Claude Code's hook runner expects. Exits nonzero only on transport
/// failure — an `ask`/`deny` decision is still a successful hook run.
pub fn run() -> anyhow::Result<()> {
    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw).context("reading hook input from stdin")?;
    let input: PreToolUseInput = serde_json::from_str(&raw).context("parsing PreToolUse hook input")?;

    let socket_path = std::env::var("BANJO_PERMISSION_SOCKET").context("BANJO_PERMISSION_SOCKET not set")?;

    let request = HookRequest {
        tool_name: input.tool_name,
        tool_input: input.tool_input,
        tool_use_id: input.tool_use_id.unwrap_or_default(),
        session_id: input.session_id,
    };

    let response = ask_daemon(&socket_path, &request)?;
    print_decision(&response);
    Ok(())
}

fn ask_daemon(socket_path: &str, request: &HookRequest) -> anyhow::Result<HookResponse> {
    let mut stream = UnixStream::connect(socket_path)
        .with_context(|| format!("connecting to permission socket at {socket_path}"))?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream.write_all(&line).context("writing hook request")?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    let read = reader.read_line(&mut response_line).context("reading hook response")?;
    if read == 0 {
        bail!("permission socket closed without a response");
    }

    serde_json::from_str(response_line.trim_end()).context("parsing hook response")
}

fn print_decision(response: &HookResponse) {
    let decision = match response.decision {
        HookDecision::Allow => "allow",
        HookDecision::Deny => "deny",
        HookDecision::Ask => "ask",
    };
    let payload = json!({
        "hookSpecificOutput": {
            "hookEventName": "PreToolUse",
            "permissionDecision": decision,
            "permissionDecisionReason": response.reason,
        }
    });
    println!("{payload}");
}
