//! Utility functions for cellbroker

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Percent-encoding set for a single store key segment
const SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&')
    .add(b'=')
    .add(b'+');

/// Encode a store key for use in a URL path, keeping `/` separators.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Encode a form/query value
pub fn encode_form_value(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Generate a unique node identifier
pub fn generate_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a random alphanumeric password
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Validate an instance ID (non-empty, usable as a store key segment)
pub fn validate_instance_id(id: &str) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::Error::InvalidParameters(
            "instance id cannot be empty".into(),
        ));
    }

    if id.len() > 256 {
        return Err(crate::Error::InvalidParameters(
            "instance id too long (max 256 bytes)".into(),
        ));
    }

    if id.contains('/') || id.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidParameters(
            "instance id contains invalid characters".into(),
        ));
    }

    Ok(())
}
