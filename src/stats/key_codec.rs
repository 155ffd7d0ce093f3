//! Key encoding for distribution counters
//!
//! Counters live as fields of one hash per time bucket. Each field name encodes
//! where an item was shown and why, plus the writer's dedup token.
//!
//! Field format: `<exp_tag>:<reason>:<position_index>:<item_id>:<dedup_token>`
//!
//! Examples:
//! - `c:normal:9:5120:e0286130`
//! - `b:boost:0:77:1f2e3d4c`

use super::types::CounterKey;
use crate::error::StatError;

/// Separator between key components
pub const FIELD_SEPARATOR: char = ':';

/// Number of components in a counter field
pub const FIELD_PARTS: usize = 5;

/// Encodes and decodes counter field names
pub struct KeyCodec;

impl KeyCodec {
    /// Decode a counter field name
    ///
    /// Fails when the field does not have exactly five components or when the
    /// position index is not a non-negative integer. The dedup token is checked
    /// for presence and then discarded.
    pub fn decode(raw_key: &str) -> Result<CounterKey, StatError> {
        let parts: Vec<&str> = raw_key.split(FIELD_SEPARATOR).collect();
        if parts.len() != FIELD_PARTS {
            return Err(StatError::malformed(
                raw_key,
                format!(
                    "expected {} components, found {}",
                    FIELD_PARTS,
                    parts.len()
                ),
            ));
        }

        let position_index = parts[2].parse::<usize>().map_err(|_| {
            StatError::malformed(
                raw_key,
                format!("position index '{}' is not a non-negative integer", parts[2]),
            )
        })?;

        Ok(CounterKey {
            experiment_tag: parts[0].to_string(),
            reason: parts[1].to_string(),
            position_index,
            item_id: parts[3].to_string(),
        })
    }

    /// Encode the label a writer counts under
    ///
    /// Format: `<exp_tag>:<reason>:<position_index>:<item_id>`
    pub fn encode_label(
        experiment_tag: &str,
        reason: &str,
        position_index: usize,
        item_id: &str,
    ) -> Result<String, StatError> {
        for (name, component) in [
            ("experiment tag", experiment_tag),
            ("reason", reason),
            ("item id", item_id),
        ] {
            if component.contains(FIELD_SEPARATOR) {
                return Err(StatError::malformed(
                    component,
                    format!("{} must not contain '{}'", name, FIELD_SEPARATOR),
                ));
            }
        }

        Ok(format!(
            "{}:{}:{}:{}",
            experiment_tag, reason, position_index, item_id
        ))
    }

    /// Append a writer's dedup token to a label, producing the stored field name
    pub fn encode_field(label: &str, dedup_token: &str) -> String {
        format!("{}{}{}", label, FIELD_SEPARATOR, dedup_token)
    }
}
