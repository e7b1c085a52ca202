// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pure patch application over YAML machine configuration documents.
//!
//! A mapping document is merged recursively into the target: nested mappings
//! merge key by key, everything else (scalars and sequences) is replaced, so
//! later patches win at the field level. A key whose patch value is
//! `{"$patch": "delete"}` is removed from the target. A sequence document is
//! treated as an RFC 6902 JSON patch.

use super::Patch;
use crate::shared::error::{ProvisionError, Result};
use serde_yaml::{Mapping, Value};

const PATCH_DIRECTIVE: &str = "$patch";
const PATCH_DELETE: &str = "delete";

/// Apply every document of `patch` to `doc`, returning the patched copy.
pub fn apply(doc: &Value, patch: &Patch) -> Result<Value> {
    let mut result = doc.clone();
    for document in &patch.documents {
        result = match document {
            Value::Mapping(delta) => {
                merge_mapping(&mut result, delta);
                result
            }
            Value::Sequence(_) => apply_json_patch(&result, document, patch)?,
            other => {
                return Err(ProvisionError::invalid_patch(
                    &patch.source,
                    format!(
                        "expected a mapping or a list of JSON patch operations, found {}",
                        type_name(other)
                    ),
                ))
            }
        };
    }
    Ok(result)
}

/// Fold `patches` over `doc` in order.
pub fn apply_all<'a, I>(doc: &Value, patches: I) -> Result<Value>
where
    I: IntoIterator<Item = &'a Patch>,
{
    patches
        .into_iter()
        .try_fold(doc.clone(), |current, patch| apply(&current, patch))
}

fn merge_mapping(target: &mut Value, delta: &Mapping) {
    if !target.is_mapping() {
        *target = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(target_map) = target else {
        return;
    };

    for (key, value) in delta {
        if is_delete_directive(value) {
            target_map.remove(key);
            continue;
        }
        if let Value::Mapping(nested) = value {
            let entry = target_map.entry(key.clone()).or_insert(Value::Null);
            merge_mapping(entry, nested);
        } else {
            target_map.insert(key.clone(), value.clone());
        }
    }
}

fn is_delete_directive(value: &Value) -> bool {
    value
        .as_mapping()
        .and_then(|m| m.get(PATCH_DIRECTIVE))
        .and_then(Value::as_str)
        .map(|directive| directive == PATCH_DELETE)
        .unwrap_or(false)
}

fn apply_json_patch(doc: &Value, operations: &Value, patch: &Patch) -> Result<Value> {
    let invalid = |reason: String| ProvisionError::invalid_patch(&patch.source, reason);

    let operations: json_patch::Patch = serde_json::to_value(operations)
        .and_then(serde_json::from_value)
        .map_err(|e| invalid(format!("not a valid JSON patch: {}", e)))?;

    let mut json = serde_json::to_value(doc)
        .map_err(|e| invalid(format!("target document is not JSON compatible: {}", e)))?;
    json_patch::patch(&mut json, &operations).map_err(|e| invalid(e.to_string()))?;
    serde_yaml::to_value(&json).map_err(|e| invalid(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
