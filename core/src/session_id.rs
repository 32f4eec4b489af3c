use rand::RngCore;

/// Lower-case hex of 16 cryptographically-random bytes, optionally prefixed.
/// Honors `BANJO_TEST_SESSION_ID` so snapshot tests can pin a deterministic
/// value instead of a fresh random one each run.
pub fn generate_session_id(prefix: Option<&str>) -> String {
    if let Ok(fixed) = std::env::var("BANJO_TEST_SESSION_ID") {
        return match prefix {
            Some(p) => format!("{p}-{fixed}"),
            None => fixed,
        };
    }

    let mut bytes = [0_u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    match prefix {
        Some(p) => format!("{p}-{hex}"),
        None => hex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn random_ids_are_32_hex_chars() {
        let id = generate_session_id(None);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prefix_is_prepended() {
        let id = generate_session_id(Some("banjo"));
        assert!(id.starts_with("banjo-"));
    }

    #[test]
    #[serial]
    fn test_override_env_var_is_honored() {
        std::env::set_var("BANJO_TEST_SESSION_ID", "fixed-id");
        assert_eq!(generate_session_id(None), "fixed-id");
        assert_eq!(generate_session_id(Some("p")), "p-fixed-id");
        std::env::remove_var("BANJO_TEST_SESSION_ID");
    }
}
