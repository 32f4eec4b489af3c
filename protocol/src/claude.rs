//! Claude Code's `--output-format stream-json` wire shapes. Every line on
//! stdout is one `StreamMessage`, newline-delimited, tagged by `type`.
//!
//! Claude's tool_result content is polymorphic (string, single block, or
//! array of blocks); `ToolResultContent` normalizes that before
//! `extract_text` picks the first text block out of it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    System {
        subtype: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        slash_commands: Vec<String>,
        #[serde(default)]
        tools: Vec<String>,
    },
    Assistant {
        message: InnerMessage,
    },
    User {
        message: InnerMessage,
    },
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
    },
    StreamEvent {
        event: StreamEvent,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<Value>,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// `tool_result.content` is a string, a single `{type, text}` block, or an
/// array of such blocks. This normalizes all three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Block(TextBlock),
    Blocks(Vec<TextBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ToolResultContent {
    /// First text block's text, ignoring blocks whose declared type disagrees.
    pub fn extract_text(&self) -> Option<&str> {
        match self {
            ToolResultContent::Text(s) => Some(s.as_str()),
            ToolResultContent::Block(b) => b.text.as_deref(),
            ToolResultContent::Blocks(blocks) => blocks.iter().find_map(|b| {
                if b.block_type.as_deref().is_none_or(|t| t == "text") {
                    b.text.as_deref()
                } else {
                    None
                }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    MessageStop,
    ContentBlockStart,
    ContentBlockDelta { delta: Delta },
    ContentBlockStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

/// Metadata published on `system`/`init`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitInfo {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub slash_commands: Vec<String>,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSubtype {
    Init,
    AuthRequired,
    HookResponse,
    Other,
}

impl SystemSubtype {
    pub fn from_str(s: &str) -> Self {
        match s {
            "init" => SystemSubtype::Init,
            "auth_required" => SystemSubtype::AuthRequired,
            "hook_response" => SystemSubtype::HookResponse,
            _ => SystemSubtype::Other,
        }
    }
}

impl StreamMessage {
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// `system` direct content or `message.text` fallback; assistant's first text block.
    pub fn content(&self) -> Option<&str> {
        match self {
            StreamMessage::System { content, .. } => content.as_deref(),
            StreamMessage::Assistant { message } | StreamMessage::User { message } => {
                message.content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
            }
            _ => None,
        }
    }

    pub fn tool_use(&self) -> Option<(&str, &str, Option<&Value>)> {
        let message = match self {
            StreamMessage::Assistant { message } => message,
            _ => return None,
        };
        message.content.iter().find_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input.as_ref())),
            _ => None,
        })
    }

    pub fn tool_result(&self) -> Option<ClaudeToolResult<'_>> {
        let message = match self {
            StreamMessage::Assistant { message } | StreamMessage::User { message } => message,
            _ => return None,
        };
        message.content.iter().find_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                error,
            } => Some(ClaudeToolResult {
                tool_use_id: tool_use_id.as_deref(),
                content: content.as_ref(),
                is_error: is_error.unwrap_or(false) || error.as_deref().is_some_and(|e| !e.is_empty()),
            }),
            _ => None,
        })
    }

    pub fn stream_text_delta(&self) -> Option<&str> {
        match self {
            StreamMessage::StreamEvent {
                event: StreamEvent::ContentBlockDelta {
                    delta: Delta::TextDelta { text },
                },
            } => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn stream_thinking_delta(&self) -> Option<&str> {
        match self {
            StreamMessage::StreamEvent {
                event: StreamEvent::ContentBlockDelta {
                    delta: Delta::ThinkingDelta { thinking },
                },
            } => Some(thinking.as_str()),
            _ => None,
        }
    }

    pub fn init_info(&self) -> Option<InitInfo> {
        match self {
            StreamMessage::System {
                session_id,
                model,
                slash_commands,
                tools,
                ..
            } => Some(InitInfo {
                session_id: session_id.clone(),
                model: model.clone(),
                slash_commands: slash_commands.clone(),
                tools: tools.clone(),
            }),
            _ => None,
        }
    }

    pub fn system_subtype(&self) -> Option<SystemSubtype> {
        match self {
            StreamMessage::System { subtype: Some(s), .. } => Some(SystemSubtype::from_str(s)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaudeToolResult<'a> {
    pub tool_use_id: Option<&'a str>,
    pub content: Option<&'a ToolResultContent>,
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_system_init() {
        let line = r#"{"type":"system","subtype":"init","session_id":"s1","model":"sonnet","slash_commands":["compact"],"tools":["Bash"]}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        assert_eq!(msg.system_subtype(), Some(SystemSubtype::Init));
        let info = msg.init_info().expect("init info");
        assert_eq!(info.session_id.as_deref(), Some("s1"));
        assert_eq!(info.tools, vec!["Bash".to_string()]);
    }

    #[test]
    fn decodes_assistant_text_and_tool_use() {
        let line = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"hi"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        assert_eq!(msg.content(), Some("hi"));
        let (id, name, input) = msg.tool_use().expect("tool use");
        assert_eq!(id, "t1");
        assert_eq!(name, "Bash");
        assert!(input.is_some());
    }

    #[test]
    fn tool_result_content_string_variant() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        let result = msg.tool_result().expect("tool result");
        assert_eq!(result.tool_use_id, Some("t1"));
        assert_eq!(result.content.and_then(|c| c.extract_text()), Some("ok"));
        assert!(!result.is_error);
    }

    #[test]
    fn tool_result_content_block_array_variant() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"line1"}]}]}}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        let result = msg.tool_result().expect("tool result");
        assert_eq!(result.content.and_then(|c| c.extract_text()), Some("line1"));
    }

    #[test]
    fn tool_result_error_field_without_bool_still_flags_error() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","error":"boom"}]}}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        assert!(msg.tool_result().expect("tool result").is_error);
    }

    #[test]
    fn stream_deltas_decode() {
        let text = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"ab"}}}"#;
        assert_eq!(StreamMessage::from_line(text).expect("decode").stream_text_delta(), Some("ab"));

        let thinking = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"hm"}}}"#;
        assert_eq!(
            StreamMessage::from_line(thinking).expect("decode").stream_thinking_delta(),
            Some("hm")
        );

        let input_json = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{"}}}"#;
        let msg = StreamMessage::from_line(input_json).expect("decode");
        assert_eq!(msg.stream_text_delta(), None);
        assert_eq!(msg.stream_thinking_delta(), None);
    }

    #[test]
    fn unrecognized_type_decodes_to_unknown() {
        let line = r#"{"type":"some_future_type","whatever":1}"#;
        assert_eq!(StreamMessage::from_line(line).expect("decode"), StreamMessage::Unknown);
    }

    #[test]
    fn result_message_carries_stop_reason_subtype() {
        let line = r#"{"type":"result","subtype":"error_max_turns","result":"too many turns","is_error":true}"#;
        let msg = StreamMessage::from_line(line).expect("decode");
        match msg {
            StreamMessage::Result { subtype, is_error, .. } => {
                assert_eq!(subtype, "error_max_turns");
                assert!(is_error);
            }
            other => panic!("expected Result, got {other:?}"),
        }
    }
}
