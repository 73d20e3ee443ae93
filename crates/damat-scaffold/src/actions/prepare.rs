//! Prepare: rewrite the manifest and write environment defaults.

use std::path::Path;

use damat_process::ExecOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ensure_live;
use crate::error::Result;
use crate::manifest::{self, ManifestStore, MANIFEST_FILE};

/// Changes applied to a freshly cloned manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestUpdate {
    pub name: String,
    /// `packageManager` pin; `None` omits the field.
    pub package_manager: Option<String>,
    /// Version for namespaced dependencies, if overridden.
    pub version: Option<String>,
    pub namespace_prefix: String,
    pub version_exempt: Vec<String>,
}

/// Read, update and write back `dir/package.json`.
pub async fn rewrite_manifest(
    store: &dyn ManifestStore,
    dir: &Path,
    update: &ManifestUpdate,
    exec: &ExecOptions,
) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    ensure_live(exec)?;
    let mut manifest = store.read_manifest(&path).await?;

    manifest::set_name(&mut manifest, &update.name);
    manifest::set_package_manager(&mut manifest, update.package_manager.as_deref());
    if let Some(version) = &update.version {
        let updated = manifest::update_versions(
            &mut manifest,
            version,
            &update.namespace_prefix,
            &update.version_exempt,
        );
        debug!(version = %version, updated, "Pinned framework dependencies");
    }

    ensure_live(exec)?;
    store.write_manifest(&path, &manifest).await
}

/// Append `block` to `dir/.env`, creating the file if needed.
pub async fn append_env_defaults(dir: &Path, block: &str, exec: &ExecOptions) -> Result<()> {
    ensure_live(exec)?;
    let path = dir.join(".env");
    let needs_separator = match tokio::fs::read(&path).await {
        Ok(existing) => !existing.is_empty() && !existing.ends_with(b"\n"),
        Err(_) => false,
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    if needs_separator {
        file.write_all(b"\n").await?;
    }
    file.write_all(block.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FsManifestStore;
    use damat_process::CancellationToken;
    use serde_json::Value;

    fn live() -> ExecOptions {
        ExecOptions::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn test_rewrite_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"starter","dependencies":{"@damatjs/framework":"0.1.0","@damatjs/ui":"1.0.0"}}"#,
        )
        .unwrap();

        let update = ManifestUpdate {
            name: "my-shop".to_string(),
            package_manager: Some("bun@1.1.0".to_string()),
            version: Some("latest".to_string()),
            namespace_prefix: "@damatjs/".to_string(),
            version_exempt: vec!["@damatjs/ui".to_string()],
        };
        rewrite_manifest(&FsManifestStore, dir.path(), &update, &live())
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(written["name"], "my-shop");
        assert_eq!(written["packageManager"], "bun@1.1.0");
        assert_eq!(written["dependencies"]["@damatjs/framework"], "latest");
        assert_eq!(written["dependencies"]["@damatjs/ui"], "1.0.0");
    }

    #[tokio::test]
    async fn test_rewrite_without_pin_or_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"starter","dependencies":{"@damatjs/framework":"0.1.0"}}"#,
        )
        .unwrap();

        let update = ManifestUpdate {
            name: "damat-module".to_string(),
            ..Default::default()
        };
        rewrite_manifest(&FsManifestStore, dir.path(), &update, &live())
            .await
            .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(written["name"], "damat-module");
        assert!(written.get("packageManager").is_none());
        assert_eq!(written["dependencies"]["@damatjs/framework"], "0.1.0");
    }

    #[tokio::test]
    async fn test_append_env_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "EXISTING=1").unwrap();

        append_env_defaults(dir.path(), "REDIS_URL=redis://localhost:6379", &live())
            .await
            .unwrap();

        let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(env, "EXISTING=1\nREDIS_URL=redis://localhost:6379");
    }

    #[tokio::test]
    async fn test_append_env_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        append_env_defaults(dir.path(), "JWT_SECRET=supersecret", &live())
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".env")).unwrap(),
            "JWT_SECRET=supersecret"
        );
    }

    #[tokio::test]
    async fn test_cancelled_prepare_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = append_env_defaults(dir.path(), "A=1", &ExecOptions::new(token))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dir.path().join(".env").exists());
    }
}
