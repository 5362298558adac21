//! Table extraction from Trino tool arguments.

use serde_json::Value;

use crate::providers::TableIdentifier;

/// Pull the target table out of a Trino tool's arguments.
///
/// Tools pass either a combined `table = "catalog.schema.table"` or separate
/// `catalog` / `schema` / `table` fields. Anything unparseable counts as "no
/// table" and disables enrichment for the call.
pub(crate) fn table_from_args(args: &Value) -> Option<TableIdentifier> {
    let obj = args.as_object()?;
    let table = obj.get("table").and_then(Value::as_str)?;
    if table.contains('.') {
        return TableIdentifier::parse(table);
    }
    let catalog = obj.get("catalog").and_then(Value::as_str)?;
    let schema = obj.get("schema").and_then(Value::as_str)?;
    TableIdentifier::from_parts(catalog, schema, table)
}
