//! Wire types for the banjo broker: the common event vocabulary both
//! engine-specific bridges normalize into, plus the raw JSON shapes each
//! subprocess speaks on the wire.

pub mod approval;
pub mod claude;
pub mod codex;
pub mod engine;
pub mod hook;
pub mod jsonrpc;
pub mod stop_reason;
pub mod tool;

pub use approval::{ApprovalDecision, ApprovalRequest};
pub use engine::Engine;
pub use hook::{HookDecision, HookRequest, HookResponse};
pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use stop_reason::StopReason;
pub use tool::{ToolCall, ToolKind, ToolResult, ToolStatus};
