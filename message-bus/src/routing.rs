//! Topic routing
//!
//! Routing keys are dot-separated words. Binding patterns use `*` for
//! exactly one word and `#` for zero or more words.

use crate::{Error, Result};

/// Check whether a routing key matches a binding pattern
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_from(&pattern, &key)
}

fn matches_from(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_from(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_from(rest, &key[1..]),
        Some((word, rest)) => key.first() == Some(word) && matches_from(rest, &key[1..]),
    }
}

/// Translate a binding pattern into a NATS subject filter under `prefix`
///
/// NATS only supports the multi-word wildcard as the final token.
pub fn nats_filter(prefix: &str, pattern: &str) -> Result<String> {
    let words: Vec<&str> = pattern.split('.').collect();
    let mut tokens = Vec::with_capacity(words.len());

    for (i, word) in words.iter().enumerate() {
        match *word {
            "#" if i + 1 == words.len() => tokens.push(">"),
            "#" => {
                return Err(Error::InvalidBinding(format!(
                    "'#' must be the last word in '{}'",
                    pattern
                )))
            }
            "" => return Err(Error::InvalidBinding(format!("empty word in '{}'", pattern))),
            other => tokens.push(other),
        }
    }

    Ok(format!("{}.{}", prefix, tokens.join(".")))
}

/// Queue names become subject tokens and durable consumer names
pub fn validate_queue_name(queue: &str) -> Result<()> {
    let valid = !queue.is_empty()
        && queue
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(Error::Subscribe(format!("invalid queue name '{}'", queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(topic_matches("check.requested", "check.requested"));
        assert!(!topic_matches("check.requested", "check.completed"));
        assert!(!topic_matches("check.requested", "check.requested.v2"));
    }

    #[test]
    fn test_single_word_wildcard() {
        assert!(topic_matches("check.*", "check.failed"));
        assert!(!topic_matches("check.*", "check"));
        assert!(!topic_matches("check.*", "check.failed.extra"));
    }

    #[test]
    fn test_multi_word_wildcard() {
        assert!(topic_matches("#", "report.ready"));
        assert!(topic_matches("check.#", "check"));
        assert!(topic_matches("check.#", "check.completed"));
        assert!(topic_matches("#.ready", "report.ready"));
        assert!(!topic_matches("check.#", "report.ready"));
    }

    #[test]
    fn test_nats_filter() {
        assert_eq!(
            nats_filter("aml.events", "check.requested").unwrap(),
            "aml.events.check.requested"
        );
        assert_eq!(nats_filter("aml.events", "check.#").unwrap(), "aml.events.check.>");
        assert_eq!(nats_filter("aml.events", "*.failed").unwrap(), "aml.events.*.failed");
        assert!(nats_filter("aml.events", "#.failed").is_err());
        assert!(nats_filter("aml.events", "check..x").is_err());
    }

    #[test]
    fn test_queue_names() {
        assert!(validate_queue_name("q_aml_requests").is_ok());
        assert!(validate_queue_name("q.report").is_err());
        assert!(validate_queue_name("").is_err());
    }
}
