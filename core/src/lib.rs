//! Core broker machinery: subprocess bridges, the turn-engine state
//! machines that consume them, the permission socket, and the small set of
//! shared concerns (settings merge, session ids, nudge policy) they all
//! lean on.

pub mod bridge;
pub mod error;
pub mod io;
pub mod nudge;
pub mod permission_socket;
pub mod queue;
pub mod session_id;
pub mod settings;
pub mod turn;

pub use bridge::{ClaudeBridge, ClaudeStartOptions, CodexBridge, CodexEvent, CodexStartOptions, PermissionMode};
pub use permission_socket::PermissionSocket;
pub use queue::MessageQueue;
pub use turn::{claude_engine::run_claude_turn, codex_engine::run_codex_turn, PromptContext, TurnCallbacks, TurnEvent, TurnOutcome};
