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

//! Operator-supplied machine configuration patches

pub mod merger;
pub mod store;

pub use merger::{apply, apply_all};
pub use store::PatchStore;

use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;

/// Which machine configurations a patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Cluster,
    ControlPlane,
    Worker,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Cluster, Scope::ControlPlane, Scope::Worker];

    /// Subdirectory of the patches root holding this scope's files.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Scope::Cluster => "cluster",
            Scope::ControlPlane => "control-planes",
            Scope::Worker => "workers",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::ControlPlane => write!(f, "control-plane"),
            Scope::Worker => write!(f, "worker"),
        }
    }
}

/// A patch file: every YAML document it contains, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub source: PathBuf,
    pub scope: Scope,
    pub documents: Vec<Value>,
}

impl Patch {
    pub fn new(source: impl Into<PathBuf>, scope: Scope, documents: Vec<Value>) -> Self {
        Self {
            source: source.into(),
            scope,
            documents,
        }
    }

    /// Parse `content` as one or more YAML documents.
    pub fn from_yaml(
        source: impl Into<PathBuf>,
        scope: Scope,
        content: &str,
    ) -> Result<Self, serde_yaml::Error> {
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let value = Value::deserialize(document)?;
            if !value.is_null() {
                documents.push(value);
            }
        }
        Ok(Self::new(source, scope, documents))
    }
}
