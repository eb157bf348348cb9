//! Typed, filesystem-backed artifact store. See [`ArtifactStore`] for the
//! write/read/list contract and `path` for the on-disk layout rules.

mod path;
mod store;

pub use path::{category_dir, report_filename, run_root, sidecar_path};
pub use store::ArtifactStore;
