use crate::chunk::Chunk;
use ignore::WalkBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::trace;
use tracing_unwrap::ResultExt;

/// Entry script every configuration template must provide; executed (or
/// handed to the scheduler) from inside the chunk workspace.
pub const ENTRY_SCRIPT: &str = "runcommand.sh";

/// Manifest written into every workspace: the chunk's input files,
/// newline-joined, consumed by the entry script.
pub const MANIFEST_NAME: &str = "input_data.txt";

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Configuration template directory not found: {0}")]
    TemplateMissing(PathBuf),
    #[error("Failed to prepare workspace directory {path}: {source}")]
    OutputUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to walk configuration template: {0}")]
    Walk(#[from] ignore::Error),
    #[error("Failed to copy {path} into workspace: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The materialized, isolated directory for one chunk.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub chunk_index: usize,
    pub path: PathBuf,
}

/// Materialize the workspace for one chunk: `{output_root}/{chunk.index}`
/// holding a full copy of the template plus the chunk manifest.
///
/// The workspace path is a pure function of output root and chunk index, so
/// re-running overwrites the same directory instead of duplicating it, and a
/// failure here can never touch another chunk's workspace.
pub fn materialize(
    chunk: &Chunk,
    template_dir: &Path,
    output_root: &Path,
) -> Result<Workspace, MaterializeError> {
    if !template_dir.is_dir() {
        return Err(MaterializeError::TemplateMissing(template_dir.to_owned()));
    }

    let path = output_root.join(chunk.index.to_string());
    fs::create_dir_all(&path).map_err(|source| MaterializeError::OutputUnavailable {
        path: path.clone(),
        source,
    })?;

    copy_template(template_dir, &path)?;

    let manifest = path.join(MANIFEST_NAME);
    // byte-for-byte reproducible: newline-joined, nothing after the last item
    fs::write(&manifest, chunk.items.join("\n")).map_err(|source| {
        MaterializeError::Manifest {
            path: manifest.clone(),
            source,
        }
    })?;

    trace!(chunk = chunk.index, path = ?path, "Materialized workspace");

    Ok(Workspace {
        chunk_index: chunk.index,
        path,
    })
}

/// Recursively copy every entry of the template into the workspace,
/// overwriting same-named entries so template edits propagate on re-runs.
fn copy_template(template_dir: &Path, workspace: &Path) -> Result<(), MaterializeError> {
    let mut builder = WalkBuilder::new(template_dir);
    // templates are copied verbatim, including hidden and ignored files
    builder.standard_filters(false);

    for entry in builder.build() {
        let entry = entry?;
        // the walk is rooted at the template, the prefix always strips
        let relative = entry.path().strip_prefix(template_dir).unwrap_or_log();
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = workspace.join(relative);
        let copy_error = |source| MaterializeError::Copy {
            path: entry.path().to_owned(),
            source,
        };

        if entry.file_type().map_or(false, |kind| kind.is_dir()) {
            fs::create_dir_all(&target).map_err(copy_error)?;
        } else {
            fs::copy(entry.path(), &target).map(|_| ()).map_err(copy_error)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn chunk(index: usize, items: &[&str]) -> Chunk {
        Chunk {
            index,
            items: items.iter().map(|item| item.to_string()).collect(),
        }
    }

    fn template_with_entry_script() -> tempfile::TempDir {
        let template = tempdir().unwrap();
        fs::write(template.path().join(ENTRY_SCRIPT), "#!/bin/bash\n").unwrap();
        template
    }

    #[test]
    fn creates_workspace_at_chunk_index() {
        let template = template_with_entry_script();
        let out = tempdir().unwrap();

        let workspace =
            materialize(&chunk(3, &["a.root"]), template.path(), out.path()).unwrap();

        assert_eq!(workspace.path, out.path().join("3"));
        assert!(workspace.path.join(ENTRY_SCRIPT).is_file());
        assert!(workspace.path.join(MANIFEST_NAME).is_file());
    }

    #[test]
    fn manifest_is_newline_joined_without_trailing_content() {
        let template = template_with_entry_script();
        let out = tempdir().unwrap();

        let workspace =
            materialize(&chunk(0, &["a", "b", "c"]), template.path(), out.path()).unwrap();

        let bytes = fs::read(workspace.path.join(MANIFEST_NAME)).unwrap();
        assert_eq!(bytes, b"a\nb\nc");
    }

    #[test]
    fn rematerializing_is_idempotent() {
        let template = template_with_entry_script();
        let out = tempdir().unwrap();
        let chunk = chunk(1, &["x.root", "y.root"]);

        let first = materialize(&chunk, template.path(), out.path()).unwrap();
        let first_bytes = fs::read(first.path.join(MANIFEST_NAME)).unwrap();

        let second = materialize(&chunk, template.path(), out.path()).unwrap();
        let second_bytes = fs::read(second.path.join(MANIFEST_NAME)).unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn copies_nested_template_directories() {
        let template = template_with_entry_script();
        fs::create_dir(template.path().join("auxiliary")).unwrap();
        fs::write(
            template.path().join("auxiliary").join("cuts.json"),
            "{\"pt\": 1.5}",
        )
        .unwrap();
        fs::write(template.path().join("configuration.json"), "{}").unwrap();
        let out = tempdir().unwrap();

        let workspace = materialize(&chunk(0, &["a"]), template.path(), out.path()).unwrap();

        assert!(workspace.path.join("configuration.json").is_file());
        let nested = workspace.path.join("auxiliary").join("cuts.json");
        assert_eq!(fs::read_to_string(nested).unwrap(), "{\"pt\": 1.5}");
    }

    #[test]
    fn recopy_picks_up_template_edits() {
        let template = template_with_entry_script();
        let out = tempdir().unwrap();
        let chunk = chunk(0, &["a"]);

        materialize(&chunk, template.path(), out.path()).unwrap();
        fs::write(template.path().join(ENTRY_SCRIPT), "#!/bin/bash\necho v2\n").unwrap();
        let workspace = materialize(&chunk, template.path(), out.path()).unwrap();

        assert_eq!(
            fs::read_to_string(workspace.path.join(ENTRY_SCRIPT)).unwrap(),
            "#!/bin/bash\necho v2\n"
        );
    }

    #[test]
    fn missing_template_fails_before_creating_the_workspace() {
        let out = tempdir().unwrap();
        let absent = out.path().join("no_such_template");

        let result = materialize(&chunk(0, &["a"]), &absent, out.path());

        assert!(matches!(result, Err(MaterializeError::TemplateMissing(_))));
        assert!(!out.path().join("0").exists());
    }

    #[test]
    fn separate_chunks_get_disjoint_workspaces() {
        let template = template_with_entry_script();
        let out = tempdir().unwrap();

        let first = materialize(&chunk(0, &["a"]), template.path(), out.path()).unwrap();
        let second = materialize(&chunk(1, &["b"]), template.path(), out.path()).unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            fs::read(first.path.join(MANIFEST_NAME)).unwrap(),
            b"a".to_vec()
        );
        assert_eq!(
            fs::read(second.path.join(MANIFEST_NAME)).unwrap(),
            b"b".to_vec()
        );
    }
}
