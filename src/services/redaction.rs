//! Secret redaction guard for structured log payloads
//!
//! Any payload carrying a denylisted key or a seed-shaped value is replaced
//! wholesale with a redaction notice before it reaches a log line.

use serde_json::{json, Value};

/// Sentinel emitted instead of a payload containing secret material.
pub const REDACTION_NOTICE: &str = "[redacted: payload contained sensitive material]";

/// Key fragments that mark a payload as sensitive. Matching is
/// case-insensitive and ignores `_`/`-` separators, so `privateKey`,
/// `private_key` and `MASTER-KEY` all hit.
const KEY_DENYLIST: &[&str] = &[
    "seed",
    "secret",
    "privatekey",
    "password",
    "masterkey",
    "mnemonic",
    "passphrase",
];

/// Heuristic for ledger seed material: long alphanumeric strings starting
/// with 's'.
pub fn looks_like_seed(value: &str) -> bool {
    value.len() > 20
        && value.starts_with('s')
        && value.chars().all(|c| c.is_ascii_alphanumeric())
}

fn key_is_denylisted(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    KEY_DENYLIST.iter().any(|entry| normalized.contains(entry))
}

fn contains_secret(value: &Value) -> bool {
    match value {
        Value::String(s) => looks_like_seed(s),
        Value::Array(items) => items.iter().any(contains_secret),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key_is_denylisted(key) || contains_secret(value)),
        _ => false,
    }
}

/// Guard a payload before logging: pass it through untouched when clean,
/// replace it with the redaction notice otherwise.
pub fn guard(payload: &Value) -> Value {
    if contains_secret(payload) {
        json!({ "redacted": REDACTION_NOTICE })
    } else {
        payload.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_payload_passes_through() {
        let payload = json!({"operationId": "op-1", "amount": "1000"});
        assert_eq!(guard(&payload), payload);
    }

    #[test]
    fn test_denylisted_key_is_redacted() {
        for key in ["seed", "privateKey", "master_key", "PASSWORD", "walletSeed"] {
            let payload = json!({ key: "anything" });
            let guarded = guard(&payload);
            assert_eq!(
                guarded,
                json!({ "redacted": REDACTION_NOTICE }),
                "key {key} must trigger redaction"
            );
        }
    }

    #[test]
    fn test_seed_shaped_value_is_redacted() {
        let payload = json!({"note": "sEd7rBGm5kxzauRTAV2hbsNz7N45X91"});
        assert_eq!(guard(&payload), json!({ "redacted": REDACTION_NOTICE }));
    }

    #[test]
    fn test_nested_secret_is_redacted() {
        let payload = json!({"request": {"wallet": {"seed": "x"}}});
        assert_eq!(guard(&payload), json!({ "redacted": REDACTION_NOTICE }));
    }

    #[test]
    fn test_short_s_strings_are_not_seeds() {
        assert!(!looks_like_seed("source"));
        assert!(!looks_like_seed("s"));
        // Contains non-alphanumeric characters.
        assert!(!looks_like_seed("some sentence that is long"));
        assert!(looks_like_seed("s123456789012345678901234"));
    }
}
