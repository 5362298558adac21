//! URN extraction from DataHub tool results and arguments.

use std::collections::HashSet;

use serde_json::Value;

use crate::types::Content;

/// Gather the dataset URNs a DataHub tool call touched: any `urn` argument
/// plus every `"urn"` / `"URN"` string found in JSON carried by the result's
/// textual content. Order of first appearance is kept; duplicates dropped.
pub(crate) fn collect_urns(args: &Value, content: &[Content]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urns = Vec::new();
    let mut push = |urn: &str| {
        if !urn.is_empty() && seen.insert(urn.to_string()) {
            urns.push(urn.to_string());
        }
    };

    if let Some(urn) = args.get("urn").and_then(Value::as_str) {
        push(urn);
    }
    for block in content {
        let Some(text) = block.as_text() else { continue };
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            continue;
        };
        gather(&value, &mut push);
    }
    urns
}

fn gather(value: &Value, push: &mut impl FnMut(&str)) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if key == "urn" || key == "URN" {
                    if let Some(urn) = nested.as_str() {
                        push(urn);
                    }
                }
                gather(nested, push);
            }
        }
        Value::Array(items) => {
            for item in items {
                gather(item, push);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_from_arguments_and_content() {
        let args = json!({"urn": "urn:li:dataset:a"});
        let content = vec![Content::text(
            json!({
                "results": [
                    {"urn": "urn:li:dataset:b", "name": "b"},
                    {"nested": {"URN": "urn:li:dataset:c"}}
                ]
            })
            .to_string(),
        )];
        assert_eq!(
            collect_urns(&args, &content),
            vec![
                "urn:li:dataset:a",
                "urn:li:dataset:b",
                "urn:li:dataset:c"
            ]
        );
    }

    #[test]
    fn deduplicates_preserving_first_appearance() {
        let content = vec![
            Content::text(json!({"urn": "urn:li:dataset:a"}).to_string()),
            Content::text(json!([{"urn": "urn:li:dataset:b"}, {"urn": "urn:li:dataset:a"}]).to_string()),
        ];
        assert_eq!(
            collect_urns(&Value::Null, &content),
            vec!["urn:li:dataset:a", "urn:li:dataset:b"]
        );
    }

    #[test]
    fn ignores_non_json_text_and_non_string_urns() {
        let content = vec![
            Content::text("plain prose, not JSON"),
            Content::text(json!({"urn": 42}).to_string()),
        ];
        assert!(collect_urns(&Value::Null, &content).is_empty());
    }
}
