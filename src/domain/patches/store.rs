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

use super::{Patch, Scope};
use crate::shared::error::{ProvisionError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const PATCH_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Loads patches from `<root>/cluster`, `<root>/control-planes` and `<root>/workers`.
#[derive(Debug, Clone)]
pub struct PatchStore {
    root: PathBuf,
}

impl PatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All patches, grouped by scope (cluster, control plane, worker) and
    /// sorted by file name within each scope.
    pub fn load(&self) -> Result<Vec<Patch>> {
        let mut patches = Vec::new();
        for scope in Scope::ALL {
            patches.extend(self.load_scope(scope)?);
        }
        Ok(patches)
    }

    pub fn load_scope(&self, scope: Scope) -> Result<Vec<Patch>> {
        let dir = self.root.join(scope.dir_name());
        match fs::metadata(&dir) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), %scope, "patch directory missing, no patches for scope");
                return Ok(Vec::new());
            }
            Err(e) => return Err(store_error(&dir, e)),
        }

        let entries = fs::read_dir(&dir).map_err(|e| store_error(&dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| store_error(&dir, e))?.path();
            if path.is_file() && has_patch_extension(&path) {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut patches = Vec::with_capacity(files.len());
        for path in files {
            let content = fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
            let patch =
                Patch::from_yaml(&path, scope, &content).map_err(|e| store_error(&path, e))?;
            debug!(path = %path.display(), %scope, documents = patch.documents.len(), "loaded patch");
            patches.push(patch);
        }
        Ok(patches)
    }
}

fn has_patch_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PATCH_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn store_error(path: &Path, err: impl ToString) -> ProvisionError {
    ProvisionError::PatchStore {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_root_yields_no_patches() {
        let dir = TempDir::new().unwrap();
        let store = PatchStore::new(dir.path().join("absent"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_scopes_and_ordering() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workers/a.yaml", "machine: {}\n");
        write(dir.path(), "cluster/20-b.yml", "cluster: {}\n");
        write(dir.path(), "cluster/10-a.yaml", "cluster: {}\n");
        write(dir.path(), "control-planes/x.YAML", "machine: {}\n");
        write(dir.path(), "cluster/notes.txt", "ignored");

        let patches = PatchStore::new(dir.path()).load().unwrap();
        let names: Vec<(Scope, String)> = patches
            .iter()
            .map(|p| {
                (
                    p.scope,
                    p.source.file_name().unwrap().to_string_lossy().to_string(),
                )
            })
            .collect();

        assert_eq!(
            names,
            vec![
                (Scope::Cluster, "10-a.yaml".to_string()),
                (Scope::Cluster, "20-b.yml".to_string()),
                (Scope::ControlPlane, "x.YAML".to_string()),
                (Scope::Worker, "a.yaml".to_string()),
            ]
        );
    }

    #[test]
    fn test_multi_document_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "cluster/multi.yaml",
            "machine:\n  a: 1\n---\nmachine:\n  b: 2\n",
        );
        let patches = PatchStore::new(dir.path()).load().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].documents.len(), 2);
    }

    #[test]
    fn test_unparseable_file_is_hard_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workers/bad.yaml", "machine: [unclosed\n");
        let err = PatchStore::new(dir.path()).load().unwrap_err();
        match err {
            ProvisionError::PatchStore { path, .. } => assert!(path.ends_with("bad.yaml")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unsearchable_root_is_hard_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "patches/cluster/10-a.yaml", "cluster: {}
");
        let root = dir.path().join("patches");
        fs::set_permissions(&root, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not apply to root.
        if fs::read_dir(&root).is_ok() {
            fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = PatchStore::new(&root).load();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(ProvisionError::PatchStore { path, .. }) => assert!(path.ends_with("cluster")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
