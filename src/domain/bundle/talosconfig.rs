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

//! Talos client configuration (`talosconfig`) document.

use crate::shared::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub contexts: BTreeMap<String, TalosContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TalosContext {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TalosConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn current(&self) -> Option<&TalosContext> {
        self.context
            .as_ref()
            .and_then(|name| self.contexts.get(name))
    }

    pub fn current_mut(&mut self) -> Option<&mut TalosContext> {
        let name = self.context.clone()?;
        self.contexts.get_mut(&name)
    }

    pub fn endpoints(&self) -> &[String] {
        self.current()
            .map(|ctx| ctx.endpoints.as_slice())
            .unwrap_or_default()
    }

    /// Replace the endpoint list of the current context.
    pub fn set_endpoints(&mut self, endpoints: Vec<String>) -> Result<()> {
        let ctx = self.current_mut().ok_or_else(|| {
            ProvisionError::Talos("talosconfig has no current context".to_string())
        })?;
        ctx.endpoints = endpoints;
        Ok(())
    }

    /// Upsert every context of `other` and make its current context ours.
    pub fn merge(&mut self, other: &TalosConfig) {
        for (name, ctx) in &other.contexts {
            self.contexts.insert(name.clone(), ctx.clone());
        }
        if other.context.is_some() {
            self.context = other.context.clone();
        }
    }
}
