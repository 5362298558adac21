//! Dataset search queries from S3 tool arguments.

use serde_json::Value;

/// Build the `{bucket}/{prefix}` catalog search query for an S3 tool call.
/// Returns `None` when no bucket is present.
pub(crate) fn location_query(args: &Value) -> Option<String> {
    let obj = args.as_object()?;
    let bucket = obj.get("bucket").and_then(Value::as_str)?.trim();
    if bucket.is_empty() {
        return None;
    }
    let prefix = obj
        .get("prefix")
        .or_else(|| obj.get("key"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    Some(format!("{bucket}/{prefix}"))
}
