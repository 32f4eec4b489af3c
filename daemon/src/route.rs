use std::str::FromStr;

/// Which engine(s) a session routes prompts to, driven by `BANJO_ROUTE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum Route {
    Claude,
    Codex,
    Duet,
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(Route::Claude),
            "codex" => Ok(Route::Codex),
            "duet" => Ok(Route::Duet),
            other => Err(format!("unknown route `{other}` (expected claude, codex, or duet)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_routes_case_insensitively() {
        assert_eq!(Route::from_str("Claude"), Ok(Route::Claude));
        assert_eq!(Route::from_str("codex"), Ok(Route::Codex));
        assert_eq!(Route::from_str("DUET"), Ok(Route::Duet));
    }

    #[test]
    fn rejects_unknown_route() {
        assert!(Route::from_str("gpt").is_err());
    }
}
