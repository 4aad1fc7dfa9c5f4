//! Project snapshot rendering.
//!
//! A project's edge record is the full set of its flags, never a diff:
//!
//! ```json
//! {"checkout":{"value":"true","type":"BOOLEAN"},"limit":{"value":"10","type":"NUMBER"}}
//! ```
//!
//! Keys are emitted in sorted order so the same flag set always renders to
//! the same bytes.

use std::collections::BTreeMap;

use serde::Serialize;
use vex_db::{Flag, FlagType};

#[derive(Serialize)]
struct RenderedFlag<'a> {
    value: &'a str,
    #[serde(rename = "type")]
    flag_type: FlagType,
}

/// Render the edge snapshot for a project's flags.
pub fn render_snapshot(flags: &[Flag]) -> Result<String, serde_json::Error> {
    let snapshot: BTreeMap<&str, RenderedFlag<'_>> = flags
        .iter()
        .map(|flag| {
            (
                flag.key.as_str(),
                RenderedFlag {
                    value: &flag.value,
                    flag_type: flag.flag_type,
                },
            )
        })
        .collect();

    serde_json::to_string(&snapshot)
}
