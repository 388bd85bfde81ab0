use anyhow::{Context, Result};
use extract::ConsolidatedResult;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Where the result for `source` lands. The path relative to `root` is
/// mirrored under `output_dir` and the full file name is kept, so
/// `a/report.txt`, `b/report.txt` and `a/report.md` never collide:
/// `<output_dir>/a/report.txt.json`.
pub fn output_path(output_dir: &Path, root: &Path, source: &Path) -> PathBuf {
    let relative = source
        .strip_prefix(root)
        .ok()
        .filter(|r| r.file_name().is_some())
        .or_else(|| source.file_name().map(Path::new))
        .unwrap_or_else(|| Path::new("document"));

    let mut file_name = relative.as_os_str().to_os_string();
    file_name.push(".json");
    output_dir.join(file_name)
}

/// Serialize in memory, write a hidden sibling, then rename over the final
/// path. Readers never observe a half-written file.
pub async fn write_result(
    output_dir: &Path,
    root: &Path,
    source: &Path,
    result: &ConsolidatedResult,
) -> Result<PathBuf> {
    let json = serde_json::to_vec_pretty(result).context("Failed to serialize result")?;

    let final_path = output_path(output_dir, root, source);
    let parent = final_path.parent().unwrap_or(output_dir);
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("Failed to create {}", parent.display()))?;

    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &final_path)
        .await
        .with_context(|| format!("Failed to move result into {}", final_path.display()))?;

    debug!(path = %final_path.display(), bytes = json.len(), "Wrote result");
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{ConsolidatedLevel, RunMetadata, RunStatus};
    use uuid::Uuid;

    fn result() -> ConsolidatedResult {
        ConsolidatedResult {
            summary: "Acme entered administration.".into(),
            bankruptcy_level: ConsolidatedLevel::determined(0.8),
            entities: Vec::new(),
            relations: Vec::new(),
            metadata: RunMetadata {
                run_id: Uuid::new_v4(),
                source_id: "reports/acme.txt".into(),
                doc_id: "abc".into(),
                model: "llama3".into(),
                status: RunStatus::Complete,
                total_tokens: 80,
                chunks: Vec::new(),
                unresolved_relations: 0,
                elapsed_ms: 12,
            },
        }
    }

    #[test]
    fn test_output_path_keeps_relative_path_and_extension() {
        let root = Path::new("reports");
        let path = output_path(Path::new("out"), root, Path::new("reports/q3/acme.txt"));
        assert_eq!(path, PathBuf::from("out/q3/acme.txt.json"));

        // single-file requests use the file's own directory as the root
        let path = output_path(Path::new("out"), Path::new("reports"), Path::new("reports/acme.md"));
        assert_eq!(path, PathBuf::from("out/acme.md.json"));
    }

    #[test]
    fn test_same_stem_inputs_get_distinct_paths() {
        let out = Path::new("out");
        let root = Path::new("in");
        let paths = [
            output_path(out, root, Path::new("in/a/report.txt")),
            output_path(out, root, Path::new("in/b/report.txt")),
            output_path(out, root, Path::new("in/a/report.md")),
        ];
        assert_ne!(paths[0], paths[1]);
        assert_ne!(paths[0], paths[2]);
        assert_ne!(paths[1], paths[2]);
    }

    #[test]
    fn test_source_outside_root_falls_back_to_file_name() {
        let path = output_path(Path::new("out"), Path::new("elsewhere"), Path::new("in/acme.txt"));
        assert_eq!(path, PathBuf::from("out/acme.txt.json"));
    }

    #[tokio::test]
    async fn test_write_result_is_complete_json() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("nested/output");

        let path = write_result(&output_dir, Path::new(""), Path::new("acme.txt"), &result())
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["summary"], "Acme entered administration.");
        assert_eq!(written["bankruptcy_level"]["band"], "at_risk");
        assert_eq!(written["metadata"]["status"], "complete");

        // only the final file remains
        let names: Vec<_> = std::fs::read_dir(&output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("acme.txt.json")]);
    }

    #[tokio::test]
    async fn test_write_result_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("acme.md.json"), "stale").unwrap();

        let path = write_result(dir.path(), Path::new(""), Path::new("acme.md"), &result())
            .await
            .unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("administration"));
    }

    #[tokio::test]
    async fn test_nested_sources_written_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let root = Path::new("in");

        let first = write_result(dir.path(), root, Path::new("in/a/report.txt"), &result())
            .await
            .unwrap();
        let second = write_result(dir.path(), root, Path::new("in/b/report.txt"), &result())
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }
}
