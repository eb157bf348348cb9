use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// `output/runs/<run_id>/`
pub fn run_root(output_root: &Path, run_id: &str) -> PathBuf {
    output_root.join("runs").join(run_id)
}

/// `output/runs/<run_id>/<category>/[<module_id>/]`
pub fn category_dir(output_root: &Path, run_id: &str, category: &str, module_id: Option<&str>) -> PathBuf {
    let dir = run_root(output_root, run_id).join(category);
    match module_id {
        Some(id) => dir.join(id),
        None => dir,
    }
}

/// `<artifact_filename>.meta.json`, sitting next to the artifact it describes.
pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".meta.json");
    artifact_path.with_file_name(name)
}

/// `YYYYMMDDTHHMMSSZ`, fixed 16-char UTC timestamp form used in report filenames.
pub fn report_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `<ts>_<agent>_<uuid>.txt`, a collision-free report archive filename.
pub fn report_filename(now: DateTime<Utc>, agent_id: &str) -> String {
    format!(
        "{}_{}_{}.txt",
        report_timestamp(now),
        agent_id,
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_suffix() {
        let p = PathBuf::from("/out/runs/r1/architecture/architecture.md");
        assert_eq!(
            sidecar_path(&p),
            PathBuf::from("/out/runs/r1/architecture/architecture.md.meta.json")
        );
    }

    #[test]
    fn report_timestamp_is_sixteen_chars() {
        let ts = report_timestamp(Utc::now());
        assert_eq!(ts.len(), 16);
        assert!(ts.ends_with('Z'));
    }
}
