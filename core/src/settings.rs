use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::NamedTempFile;

use crate::error::SettingsError;

const HOOK_COMMAND: &str = "banjo hook permission";

fn settings_path(home: &Path) -> PathBuf {
    home.join(".claude").join("settings.json")
}

/// Idempotently inserts a `PreToolUse` hook entry pointing at
/// `banjo hook permission` into `$HOME/.claude/settings.json`. Unknown keys
/// already in the file are preserved; a second call is a no-op.
pub fn register_permission_hook(home: &Path) -> Result<(), SettingsError> {
    let path = settings_path(home);
    let mut root = read_settings(&path)?;

    let object = root.as_object_mut().ok_or(SettingsError::NotAnObject)?;
    let hooks = object
        .entry("hooks")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or(SettingsError::NotAnObject)?;
    let pre_tool_use = hooks.entry("PreToolUse").or_insert_with(|| json!([])).as_array_mut().ok_or(SettingsError::NotAnObject)?;

    let already_registered = pre_tool_use.iter().any(|entry| entry_has_command(entry, HOOK_COMMAND));
    if already_registered {
        return Ok(());
    }

    pre_tool_use.push(json!({
        "matcher": "*",
        "hooks": [{ "type": "command", "command": HOOK_COMMAND }],
    }));

    write_atomic_json(&path, &root)
}

fn entry_has_command(entry: &Value, command: &str) -> bool {
    entry
        .get("hooks")
        .and_then(Value::as_array)
        .is_some_and(|hooks| hooks.iter().any(|h| h.get("command").and_then(Value::as_str) == Some(command)))
}

fn read_settings(path: &Path) -> Result<Value, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
        Err(source) => Err(SettingsError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `value` pretty-printed with a trailing newline, atomically, via a
/// sibling temp file that is then persisted over the destination.
fn write_atomic_json(path: &Path, value: &Value) -> Result<(), SettingsError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    let mut contents = serde_json::to_string_pretty(value).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    contents.push('\n');

    let mut temp = NamedTempFile::new_in(parent).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    temp.write_all(contents.as_bytes()).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    temp.persist(path).map_err(|e| SettingsError::Write {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn creates_settings_file_when_absent() {
        let home = tempdir().expect("tempdir");
        register_permission_hook(home.path()).expect("register");

        let contents = std::fs::read_to_string(settings_path(home.path())).expect("read");
        assert!(contents.ends_with('\n'));
        let value: Value = serde_json::from_str(&contents).expect("parse");
        assert_eq!(
            value["hooks"]["PreToolUse"][0]["hooks"][0]["command"],
            HOOK_COMMAND
        );
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let home = tempdir().expect("tempdir");
        register_permission_hook(home.path()).expect("register once");
        register_permission_hook(home.path()).expect("register twice");

        let contents = std::fs::read_to_string(settings_path(home.path())).expect("read");
        let value: Value = serde_json::from_str(&contents).expect("parse");
        let entries = value["hooks"]["PreToolUse"].as_array().expect("array");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn preserves_unknown_keys_already_present() {
        let home = tempdir().expect("tempdir");
        let dir = home.path().join(".claude");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join("settings.json"),
            r#"{"theme": "dark", "hooks": {"PreToolUse": []}}"#,
        )
        .expect("write seed");

        register_permission_hook(home.path()).expect("register");

        let contents = std::fs::read_to_string(settings_path(home.path())).expect("read");
        let value: Value = serde_json::from_str(&contents).expect("parse");
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["hooks"]["PreToolUse"].as_array().expect("array").len(), 1);
    }
}
