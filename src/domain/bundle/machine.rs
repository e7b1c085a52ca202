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

use crate::infrastructure::constants::DEFAULT_CNI;
use crate::shared::error::Result;
use serde_yaml::Value;

/// A fully patched machine configuration document for one node role.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig(Value);

impl MachineConfig {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Look up a nested mapping value by key path.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.0, |value, key| value.as_mapping()?.get(*key))
    }

    pub fn cni_name(&self) -> Option<&str> {
        self.lookup(&["cluster", "network", "cni", "name"])
            .and_then(Value::as_str)
    }

    /// True when the document asks for anything other than the default CNI,
    /// in which case workload pods cannot schedule until the operator installs one.
    pub fn uses_custom_cni(&self) -> bool {
        self.cni_name()
            .map(|name| name != DEFAULT_CNI)
            .unwrap_or(false)
    }
}
