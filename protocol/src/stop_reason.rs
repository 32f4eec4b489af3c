/// Why a turn ended. `ContextReloaded` is not a failure: it tells the caller
/// the bridge underneath it was replaced and the turn must be resumed against
/// the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    Cancelled,
    MaxTokens,
    MaxTurnRequests,
    AuthRequired,
    ContextReloaded,
}

impl StopReason {
    /// Maps the literal stop-reason strings Claude's `result` event carries.
    pub fn from_claude_str(s: &str) -> Self {
        match s {
            "cancelled" => StopReason::Cancelled,
            "max_tokens" => StopReason::MaxTokens,
            "error_max_turns" | "error_max_budget_usd" => StopReason::MaxTurnRequests,
            _ => StopReason::EndTurn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_claude_reason_maps_to_end_turn() {
        assert_eq!(StopReason::from_claude_str("success"), StopReason::EndTurn);
        assert_eq!(StopReason::from_claude_str("whatever"), StopReason::EndTurn);
    }

    #[test]
    fn known_claude_reasons_map() {
        assert_eq!(StopReason::from_claude_str("cancelled"), StopReason::Cancelled);
        assert_eq!(StopReason::from_claude_str("max_tokens"), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_claude_str("error_max_turns"),
            StopReason::MaxTurnRequests
        );
        assert_eq!(
            StopReason::from_claude_str("error_max_budget_usd"),
            StopReason::MaxTurnRequests
        );
    }
}
