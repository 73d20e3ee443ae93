//! `package.json` access and rewriting.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Result, ScaffoldError};

/// Manifest file name inside a scaffold.
pub const MANIFEST_FILE: &str = "package.json";

/// A parsed manifest. Key order is preserved on rewrite.
pub type Manifest = Map<String, Value>;

/// Reads and writes manifests.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn read_manifest(&self, path: &Path) -> Result<Manifest>;

    async fn write_manifest(&self, path: &Path, manifest: &Manifest) -> Result<()>;
}

/// Manifest store backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestStore;

#[async_trait]
impl ManifestStore for FsManifestStore {
    async fn read_manifest(&self, path: &Path) -> Result<Manifest> {
        let raw = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(manifest)) => Ok(manifest),
            Ok(_) => Err(ScaffoldError::Manifest {
                path: path.to_path_buf(),
                detail: "expected a JSON object".to_string(),
            }),
            Err(err) => Err(ScaffoldError::Manifest {
                path: path.to_path_buf(),
                detail: err.to_string(),
            }),
        }
    }

    async fn write_manifest(&self, path: &Path, manifest: &Manifest) -> Result<()> {
        let rendered = serde_json::to_string_pretty(manifest)?;
        tokio::fs::write(path, rendered).await?;
        Ok(())
    }
}

pub fn set_name(manifest: &mut Manifest, name: &str) {
    manifest.insert("name".to_string(), Value::String(name.to_string()));
}

/// Pin the `packageManager` field; `None` leaves the manifest untouched.
pub fn set_package_manager(manifest: &mut Manifest, pin: Option<&str>) {
    if let Some(pin) = pin {
        manifest.insert("packageManager".to_string(), Value::String(pin.to_string()));
    }
}

/// Set every namespaced dependency to `version`.
///
/// Applies to `dependencies` and `devDependencies`. Names that start with
/// `prefix` are updated unless listed in `exempt`. Returns how many entries
/// changed.
pub fn update_versions(
    manifest: &mut Manifest,
    version: &str,
    prefix: &str,
    exempt: &[String],
) -> usize {
    let mut updated = 0;
    for section in ["dependencies", "devDependencies"] {
        let Some(Value::Object(deps)) = manifest.get_mut(section) else {
            continue;
        };
        for (name, value) in deps.iter_mut() {
            if name.starts_with(prefix) && !exempt.iter().any(|e| e == name) {
                *value = Value::String(version.to_string());
                updated += 1;
            }
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_update_versions_skips_exempt_and_foreign() {
        let mut m = manifest(json!({
            "name": "starter",
            "dependencies": {
                "@damatjs/framework": "0.1.0",
                "@damatjs/ui": "2.3.0",
                "express": "^4.19.0"
            },
            "devDependencies": {
                "@damatjs/cli": "0.1.0",
                "typescript": "^5.4.0"
            }
        }));

        let updated = update_versions(&mut m, "1.2.0", "@damatjs/", &["@damatjs/ui".to_string()]);

        assert_eq!(updated, 2);
        assert_eq!(m["dependencies"]["@damatjs/framework"], "1.2.0");
        assert_eq!(m["dependencies"]["@damatjs/ui"], "2.3.0");
        assert_eq!(m["dependencies"]["express"], "^4.19.0");
        assert_eq!(m["devDependencies"]["@damatjs/cli"], "1.2.0");
        assert_eq!(m["devDependencies"]["typescript"], "^5.4.0");
    }

    #[test]
    fn test_update_versions_without_dependency_sections() {
        let mut m = manifest(json!({ "name": "bare" }));
        assert_eq!(update_versions(&mut m, "latest", "@damatjs/", &[]), 0);
    }

    #[test]
    fn test_set_package_manager_none_omits_field() {
        let mut m = manifest(json!({ "name": "x" }));
        set_package_manager(&mut m, None);
        assert!(!m.contains_key("packageManager"));
        set_package_manager(&mut m, Some("bun@1.1.0"));
        assert_eq!(m["packageManager"], "bun@1.1.0");
    }

    #[tokio::test]
    async fn test_fs_store_preserves_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(
            &path,
            r#"{"version":"0.0.1","name":"starter","scripts":{"dev":"damat develop"}}"#,
        )
        .unwrap();

        let store = FsManifestStore;
        let mut m = store.read_manifest(&path).await.unwrap();
        set_name(&mut m, "my-shop");
        store.write_manifest(&path, &m).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let version_at = written.find("\"version\"").unwrap();
        let name_at = written.find("\"name\"").unwrap();
        assert!(version_at < name_at);
        assert!(written.contains("  \"name\": \"my-shop\""));
    }

    #[tokio::test]
    async fn test_fs_store_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = FsManifestStore.read_manifest(&path).await.unwrap_err();
        assert!(matches!(err, ScaffoldError::Manifest { .. }));
    }

    #[tokio::test]
    async fn test_fs_store_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsManifestStore
            .read_manifest(&dir.path().join(MANIFEST_FILE))
            .await
            .unwrap_err();
        assert!(matches!(err, ScaffoldError::Io(_)));
    }
}
