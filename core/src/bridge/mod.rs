//! Per-engine subprocess supervisors: spawn, bounded-queue reader thread,
//! line framing, and graceful stop/interrupt. `claude` and `codex` don't
//! share a trait object — their wire protocols and interrupt semantics
//! differ too much to abstract usefully — but both follow the same shape
//! described in the module-level docs of each.

pub mod claude;
pub mod codex;
mod stderr_capture;

pub use claude::{ClaudeBridge, ClaudeStartOptions, PermissionMode};
pub use codex::{CodexBridge, CodexEvent, CodexStartOptions};
