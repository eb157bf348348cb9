use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use forgeline_core::{ArtifactFormat, ArtifactListing, ArtifactMetadata, ArtifactType, ForgeError, ForgeResult};
use forgeline_mcp::CapabilityMatrix;
use tracing::{info, warn};
use uuid::Uuid;

use crate::path::{category_dir, report_filename, run_root, sidecar_path};

/// Persist and retrieve typed artifacts for a run, under
/// `<output_root>/runs/<run_id>/...`. Every write is authorized against a
/// [`CapabilityMatrix`] before the file is created; every read is
/// authorized before content is returned.
pub struct ArtifactStore {
    output_root: PathBuf,
    mcp: Arc<CapabilityMatrix>,
}

impl ArtifactStore {
    pub fn new(output_root: impl Into<PathBuf>, mcp: Arc<CapabilityMatrix>) -> Self {
        Self {
            output_root: output_root.into(),
            mcp,
        }
    }

    pub fn output_dir_for(&self, run_id: &str) -> PathBuf {
        run_root(&self.output_root, run_id)
    }

    /// Write a single-file artifact. Authorizes via MCP, writes the bytes
    /// atomically (temp file + rename), then writes the sidecar. Returns
    /// the stable path of the artifact.
    pub async fn write_artifact(
        &self,
        run_id: &str,
        agent_id: &str,
        mut metadata: ArtifactMetadata,
        module_id: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> ForgeResult<PathBuf> {
        self.mcp
            .check_write(agent_id, metadata.artifact_type.dir_name())?;

        let dir = category_dir(&self.output_root, run_id, metadata.artifact_type.dir_name(), module_id);
        let path = dir.join(filename);

        if path.exists() {
            return Err(ForgeError::IoFailure(format!(
                "artifact path collision: {}",
                path.display()
            )));
        }

        atomic_write(&path, bytes).await?;

        if module_id.is_some() && metadata.module_id.is_none() {
            metadata.module_id = module_id.map(str::to_string);
        }

        let sidecar_bytes = metadata.to_canonical_json()?;
        atomic_write(&sidecar_path(&path), &sidecar_bytes).await?;

        if metadata.artifact_type == ArtifactType::Reports {
            self.maybe_write_latest_pointer(run_id, bytes).await;
        }

        info!(
            run_id,
            agent = agent_id,
            artifact_type = metadata.artifact_type.dir_name(),
            path = %path.display(),
            "wrote artifact"
        );

        Ok(path)
    }

    /// Write a multi-file `module_code` artifact: `<module_id>.h` and
    /// `<module_id>.c` under `module_code/<module_id>/`, plus one shared
    /// sidecar listing both sub-artifact filenames.
    pub async fn write_modular_code(
        &self,
        run_id: &str,
        agent_id: &str,
        module_id: &str,
        header_bytes: &[u8],
        source_bytes: &[u8],
        mut metadata: ArtifactMetadata,
    ) -> ForgeResult<(PathBuf, PathBuf)> {
        self.mcp.check_write(agent_id, ArtifactType::ModuleCode.dir_name())?;

        let dir = category_dir(&self.output_root, run_id, ArtifactType::ModuleCode.dir_name(), Some(module_id));
        let header_path = dir.join(format!("{module_id}.h"));
        let source_path = dir.join(format!("{module_id}.c"));

        if header_path.exists() || source_path.exists() {
            return Err(ForgeError::IoFailure(format!(
                "module_code path collision for module '{module_id}'"
            )));
        }

        atomic_write(&header_path, header_bytes).await?;
        atomic_write(&source_path, source_bytes).await?;

        metadata.artifact_format = ArtifactFormat::MultiFile;
        metadata.module_id = Some(module_id.to_string());
        metadata.sub_artifacts = vec![format!("{module_id}.h"), format!("{module_id}.c")];

        let sidecar_bytes = metadata.to_canonical_json()?;
        let shared_sidecar = dir.join(format!("{module_id}.meta.json"));
        atomic_write(&shared_sidecar, &sidecar_bytes).await?;

        info!(run_id, agent = agent_id, module_id, "wrote module_code artifact");

        Ok((header_path, source_path))
    }

    /// Serialize `value` as canonical JSON (sorted keys, no trailing
    /// whitespace) and write it via [`write_artifact`].
    pub async fn write_json_artifact(
        &self,
        run_id: &str,
        agent_id: &str,
        metadata: ArtifactMetadata,
        module_id: Option<&str>,
        filename: &str,
        value: &serde_json::Value,
    ) -> ForgeResult<PathBuf> {
        let bytes = canonical_json_bytes(value)?;
        self.write_artifact(run_id, agent_id, metadata, module_id, filename, &bytes)
            .await
    }

    /// Write a `reports` artifact using the standard timestamped archive
    /// filename (`<ts>_<agent>_<uuid>.txt`).
    pub async fn write_report(
        &self,
        run_id: &str,
        agent_id: &str,
        metadata: ArtifactMetadata,
        bytes: &[u8],
    ) -> ForgeResult<PathBuf> {
        let filename = report_filename(Utc::now(), agent_id);
        self.write_artifact(run_id, agent_id, metadata, None, &filename, bytes)
            .await
    }

    async fn maybe_write_latest_pointer(&self, run_id: &str, bytes: &[u8]) {
        if serde_json::from_slice::<serde_json::Value>(bytes).is_err() {
            return;
        }
        let dir = category_dir(&self.output_root, run_id, ArtifactType::Reports.dir_name(), None);
        let latest_path = dir.join("quality_report_latest.json");
        if let Err(err) = atomic_write_allow_overwrite(&latest_path, bytes).await {
            warn!(run_id, error = %err, "failed to write quality_report_latest.json pointer");
        }
    }

    /// Read an artifact's bytes by its path relative to the run's category
    /// directory (e.g. `"architecture.md"` or `"uart0/uart0.h"`).
    pub async fn read_artifact(
        &self,
        run_id: &str,
        agent_id: &str,
        artifact_type: ArtifactType,
        selector: &str,
    ) -> ForgeResult<Vec<u8>> {
        self.mcp.check_read(agent_id, artifact_type.dir_name())?;
        let path = category_dir(&self.output_root, run_id, artifact_type.dir_name(), None).join(selector);
        tokio::fs::read(&path)
            .await
            .map_err(|e| ForgeError::IoFailure(format!("reading {}: {e}", path.display())))
    }

    /// Enumerate every stored artifact (sidecars excluded) for a run.
    pub async fn list_artifacts(&self, run_id: &str) -> ForgeResult<Vec<ArtifactListing>> {
        let root = run_root(&self.output_root, run_id);
        let mut out = Vec::new();
        if !root.exists() {
            return Ok(out);
        }
        self.walk(&root, &root, run_id, &mut out).await?;
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }

    fn walk<'a>(
        &'a self,
        dir: &'a Path,
        root: &'a Path,
        run_id: &'a str,
        out: &'a mut Vec<ArtifactListing>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ForgeResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    self.walk(&path, root, run_id, out).await?;
                    continue;
                }
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                if name.ends_with(".meta.json") {
                    continue;
                }
                let meta = entry.metadata().await?;
                let relative = path.strip_prefix(root).unwrap_or(&path);
                let category = relative
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .unwrap_or_default();
                out.push(ArtifactListing {
                    run_id: run_id.to_string(),
                    category,
                    filename: relative.to_string_lossy().into_owned(),
                    size_bytes: meta.len(),
                    modified_at: meta
                        .modified()
                        .ok()
                        .map(chrono::DateTime::<Utc>::from)
                        .unwrap_or_else(Utc::now),
                });
            }
            Ok(())
        })
    }
}

fn canonical_json_bytes(value: &serde_json::Value) -> ForgeResult<Vec<u8>> {
    fn sort(value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                    map.into_iter().map(|(k, v)| (k, sort(v))).collect();
                serde_json::to_value(sorted).unwrap_or(serde_json::Value::Null)
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.into_iter().map(sort).collect()),
            other => other,
        }
    }
    Ok(serde_json::to_vec(&sort(value.clone()))?)
}

/// Write `bytes` to `path` via temp file + rename; fails if `path` already
/// exists (artifacts are write-once).
async fn atomic_write(path: &Path, bytes: &[u8]) -> ForgeResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = temp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await?;
    match tokio::fs::rename(&tmp_path, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            Err(ForgeError::IoFailure(format!(
                "renaming {} -> {}: {err}",
                tmp_path.display(),
                path.display()
            )))
        }
    }
}

/// Like [`atomic_write`] but for the one pointer file allowed to be
/// overwritten (`quality_report_latest.json`).
async fn atomic_write_allow_overwrite(path: &Path, bytes: &[u8]) -> ForgeResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = temp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        ForgeError::IoFailure(format!("renaming {} -> {}: {e}", tmp_path.display(), path.display()))
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(&format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::ArtifactFormat;

    fn matrix() -> Arc<CapabilityMatrix> {
        Arc::new(CapabilityMatrix::canonical())
    }

    #[tokio::test]
    async fn write_artifact_creates_file_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("architecture_agent", ArtifactType::Architecture, ArtifactFormat::Text);

        let path = store
            .write_artifact("run1", "architecture_agent", metadata, None, "architecture.md", b"# Hello")
            .await
            .expect("write should succeed");

        assert!(path.exists());
        assert!(sidecar_path(&path).exists());
    }

    #[tokio::test]
    async fn write_artifact_denies_unauthorized_agent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("quality_agent", ArtifactType::Reports, ArtifactFormat::Json);

        // quality_agent is allowed to write reports; code_agent is not.
        let metadata2 = ArtifactMetadata::new("code_agent", ArtifactType::Reports, ArtifactFormat::Json);
        let err = store
            .write_artifact("run1", "code_agent", metadata2, None, "quality_report_latest.json", b"{}")
            .await
            .expect_err("code_agent must not write reports");
        assert!(matches!(err, ForgeError::PermissionDenied { .. }));

        // quality_agent succeeds.
        store
            .write_artifact("run1", "quality_agent", metadata, None, "report.txt", b"ok")
            .await
            .expect("quality_agent should be allowed");
    }

    #[tokio::test]
    async fn write_artifact_rejects_path_collision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let m1 = ArtifactMetadata::new("architecture_agent", ArtifactType::Architecture, ArtifactFormat::Text);
        let m2 = ArtifactMetadata::new("architecture_agent", ArtifactType::Architecture, ArtifactFormat::Text);

        store
            .write_artifact("run1", "architecture_agent", m1, None, "architecture.md", b"first")
            .await
            .expect("first write ok");

        let err = store
            .write_artifact("run1", "architecture_agent", m2, None, "architecture.md", b"second")
            .await
            .expect_err("second write should collide");
        assert!(matches!(err, ForgeError::IoFailure(_)));
    }

    #[tokio::test]
    async fn json_report_write_also_updates_latest_pointer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("quality_agent", ArtifactType::Reports, ArtifactFormat::Json);
        let value = serde_json::json!({"overall_score": 91});

        store
            .write_json_artifact("run1", "quality_agent", metadata, None, "report.json", &value)
            .await
            .expect("write should succeed");

        let latest = dir.path().join("runs/run1/reports/quality_report_latest.json");
        assert!(latest.exists());
        let latest_bytes = tokio::fs::read(&latest).await.expect("read latest");
        let latest_value: serde_json::Value = serde_json::from_slice(&latest_bytes).expect("parse latest");
        assert_eq!(latest_value["overall_score"], 91);
    }

    #[tokio::test]
    async fn non_json_report_does_not_fail_primary_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("quality_agent", ArtifactType::Reports, ArtifactFormat::Text);

        let path = store
            .write_report("run1", "quality_agent", metadata, b"plain text summary")
            .await
            .expect("non-json report write should still succeed");
        assert!(path.exists());

        let latest = dir.path().join("runs/run1/reports/quality_report_latest.json");
        assert!(!latest.exists());
    }

    #[tokio::test]
    async fn write_modular_code_produces_header_source_and_shared_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("code_agent", ArtifactType::ModuleCode, ArtifactFormat::MultiFile);

        let (header, source) = store
            .write_modular_code("run1", "code_agent", "uart0", b"// header", b"// source", metadata)
            .await
            .expect("write should succeed");

        assert!(header.exists());
        assert!(source.exists());
        let sidecar = dir.path().join("runs/run1/module_code/uart0/uart0.meta.json");
        assert!(sidecar.exists());
    }

    #[tokio::test]
    async fn list_artifacts_excludes_sidecars() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path(), matrix());
        let metadata = ArtifactMetadata::new("architecture_agent", ArtifactType::Architecture, ArtifactFormat::Text);
        store
            .write_artifact("run1", "architecture_agent", metadata, None, "architecture.md", b"# Hi")
            .await
            .expect("write ok");

        let listing = store.list_artifacts("run1").await.expect("list ok");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].filename, "architecture/architecture.md");
    }
}
