//! Topic and pattern validation
//!
//! Key rules:
//! - Topics and patterns are 1 to 50 bytes long
//! - They must not contain a NUL byte (the wire fields are NUL terminated)
//! - Topics published over UDP are matched as-is, so `+` and `*` inside a
//!   topic are ordinary characters
//! - Wildcards inside a pattern may appear anywhere, not only as a whole level

use crate::protocol::MAX_TOPIC_LEN;

/// Validate a published topic name
pub fn validate_topic(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic cannot be empty");
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err("topic exceeds maximum length");
    }

    if topic.contains('\0') {
        return Err("topic cannot contain null character");
    }

    Ok(())
}

/// Validate a subscription pattern
pub fn validate_pattern(pattern: &str) -> Result<(), &'static str> {
    if pattern.is_empty() {
        return Err("pattern cannot be empty");
    }

    if pattern.len() > MAX_TOPIC_LEN {
        return Err("pattern exceeds maximum length");
    }

    if pattern.contains('\0') {
        return Err("pattern cannot contain null character");
    }

    Ok(())
}
