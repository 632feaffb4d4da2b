//! Upload classification, safe archive extraction, and converter dispatch —
//! the UPLOADED → CLASSIFIED → CONVERTED states of the slicing pipeline.

use crate::runner::{RunnerError, SubprocessRunner};
use slicer_config::PathsConfig;
use slicer_types::{SlicerError, SlicerResult};
use std::path::{Path, PathBuf};

const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
const VECTOR_EXTS: &[&str] = &["dxf", "svg", "eps", "pdf"];
const MESH_EXTS: &[&str] = &["obj", "3mf", "ply"];
const CAD_EXTS: &[&str] = &["stp", "step", "igs", "iges"];
pub const ARCHIVE_EXT: &str = "zip";

/// Source file kind, by extension, as dispatched to the matching converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Stl,
    Image,
    Vector,
    Mesh,
    Cad,
}

/// Classify a (lowercased) file extension into a source kind, or `None` if
/// it is outside the supported union.
pub fn classify_extension(ext: &str) -> Option<SourceKind> {
    let ext = ext.to_ascii_lowercase();
    if ext == "stl" {
        Some(SourceKind::Stl)
    } else if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(SourceKind::Image)
    } else if VECTOR_EXTS.contains(&ext.as_str()) {
        Some(SourceKind::Vector)
    } else if MESH_EXTS.contains(&ext.as_str()) {
        Some(SourceKind::Mesh)
    } else if CAD_EXTS.contains(&ext.as_str()) {
        Some(SourceKind::Cad)
    } else {
        None
    }
}

/// Scan `dir` (non-recursive) for the first file, in filename order, whose
/// extension is in the supported union.
pub fn find_supported_entry(dir: &Path) -> SlicerResult<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| SlicerError::Internal(format!("failed to read extraction directory: {e}")))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    entries
        .into_iter()
        .find(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(classify_extension)
                .is_some()
        })
        .ok_or(SlicerError::UnsupportedUpload)
}

/// Extract a zip upload into `dest_dir`, rejecting encrypted archives,
/// archives past the entry-count or uncompressed-size budget, and any entry
/// whose resolved path would escape `dest_dir`. Runs on a blocking thread
/// since the `zip` crate is synchronous.
pub async fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    max_entries: u32,
    max_uncompressed_bytes: u64,
) -> SlicerResult<()> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        extract_archive_blocking(&archive_path, &dest_dir, max_entries, max_uncompressed_bytes)
    })
    .await
    .map_err(|e| SlicerError::Internal(format!("archive extraction task panicked: {e}")))?
}

fn extract_archive_blocking(
    archive_path: &Path,
    dest_dir: &Path,
    max_entries: u32,
    max_uncompressed_bytes: u64,
) -> SlicerResult<()> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| SlicerError::Internal(format!("failed to open archive: {e}")))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| SlicerError::ArchiveRejected {
        reason: format!("not a valid zip archive: {e}"),
    })?;

    if archive.len() > max_entries as usize {
        return Err(SlicerError::ArchiveRejected {
            reason: format!(
                "archive contains {} entries, exceeding the limit of {max_entries}",
                archive.len()
            ),
        });
    }

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| SlicerError::Internal(format!("failed to create extraction directory: {e}")))?;
    let root = dest_dir
        .canonicalize()
        .map_err(|e| SlicerError::Internal(format!("failed to resolve extraction root: {e}")))?;

    let mut cumulative_bytes: u64 = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| SlicerError::ArchiveRejected {
            reason: format!("corrupt archive entry: {e}"),
        })?;

        if entry.encrypted() {
            return Err(SlicerError::ArchiveRejected {
                reason: "encrypted archives are not supported".to_string(),
            });
        }

        cumulative_bytes += entry.size();
        if cumulative_bytes > max_uncompressed_bytes {
            return Err(SlicerError::ArchiveRejected {
                reason: format!(
                    "archive exceeds the uncompressed size limit of {max_uncompressed_bytes} bytes"
                ),
            });
        }

        // `enclosed_name` already refuses absolute paths and `..` components.
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(SlicerError::ArchiveRejected {
                reason: "archive entry resolves outside the extraction root".to_string(),
            });
        };
        let out_path = dest_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| SlicerError::Internal(format!("failed to create directory: {e}")))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SlicerError::Internal(format!("failed to create directory: {e}")))?;
        }

        // Defense in depth: re-verify the resolved parent is still under
        // `root` now that it exists and can be canonicalized.
        let parent_canonical = out_path
            .parent()
            .map(|p| p.canonicalize().unwrap_or_else(|_| dest_dir.to_path_buf()))
            .unwrap_or_else(|| dest_dir.to_path_buf());
        if !parent_canonical.starts_with(&root) {
            return Err(SlicerError::ArchiveRejected {
                reason: "archive entry escapes the extraction directory".to_string(),
            });
        }

        let mut out_file = std::fs::File::create(&out_path)
            .map_err(|e| SlicerError::Internal(format!("failed to write extracted file: {e}")))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| SlicerError::Internal(format!("failed to write extracted file: {e}")))?;
    }

    Ok(())
}

/// Converts `input` to a sibling `.stl` via the converter matching `kind`.
/// `.stl` inputs pass through untouched. The converter writes to
/// `<input>.stl`, which the caller must add to its cleanup list.
pub async fn convert_to_stl(
    kind: SourceKind,
    input: &Path,
    depth: f64,
    runner: &SubprocessRunner,
    paths: &PathsConfig,
) -> SlicerResult<PathBuf> {
    if kind == SourceKind::Stl {
        return Ok(input.to_path_buf());
    }

    let binary: &str = match kind {
        SourceKind::Image => &paths.image_to_mesh_binary,
        SourceKind::Vector => &paths.vector_to_mesh_binary,
        SourceKind::Mesh => &paths.mesh_to_mesh_binary,
        SourceKind::Cad => &paths.cad_to_mesh_binary,
        SourceKind::Stl => unreachable!(),
    };

    let output = input.with_extension("stl");
    let depth_arg = depth.to_string();
    let input_str = input.to_string_lossy().into_owned();
    let output_str = output.to_string_lossy().into_owned();
    let args = [
        input_str.as_str(),
        "--depth",
        depth_arg.as_str(),
        "--output",
        output_str.as_str(),
    ];

    runner
        .run(binary, &args, None)
        .await
        .map(|_| output)
        .map_err(|err| classify_converter_error(&err))
}

/// Best-effort orientation optimization: invoke the optimizer to produce
/// `<stem>_oriented.stl`. Failure or a missing output file is never fatal —
/// the caller continues with the pre-orientation mesh.
pub async fn orient_best_effort(
    stl_path: &Path,
    runner: &SubprocessRunner,
    paths: &PathsConfig,
) -> Option<PathBuf> {
    let oriented = stl_path.with_file_name(format!(
        "{}_oriented.stl",
        stl_path.file_stem()?.to_string_lossy()
    ));
    let input_str = stl_path.to_string_lossy().into_owned();
    let output_str = oriented.to_string_lossy().into_owned();
    let args = [input_str.as_str(), "--output", output_str.as_str()];

    match runner
        .run(&paths.orientation_optimizer_binary, &args, None)
        .await
    {
        Ok(_) if oriented.exists() => Some(oriented),
        Ok(_) => {
            tracing::warn!(
                path = %oriented.display(),
                "orientation optimizer reported success but produced no output, continuing unoriented"
            );
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "orientation optimizer failed, continuing unoriented");
            None
        }
    }
}

/// Classify a converter failure per the error-classifier contract: an
/// explicit exit-code mapping (`2` = bad geometry, `3` = unreadable input)
/// takes priority; a closed set of stderr/stdout hints covers converters
/// that do not yet emit those codes; anything else is internal.
fn classify_converter_error(err: &RunnerError) -> SlicerError {
    const GEOMETRY_HINTS: &[&str] = &[
        "empty scene",
        "open polygon",
        "unreadable image",
        "failed to mesh",
        "non-manifold",
        "degenerate geometry",
    ];

    match err {
        RunnerError::NonZeroExit {
            status, message, ..
        } => match status {
            2 => SlicerError::InvalidSourceGeometry {
                detail: message.clone(),
            },
            3 => SlicerError::InvalidSourceGeometry {
                detail: format!("unreadable input: {message}"),
            },
            _ => {
                let lower = message.to_ascii_lowercase();
                if GEOMETRY_HINTS.iter().any(|hint| lower.contains(hint)) {
                    SlicerError::InvalidSourceGeometry {
                        detail: message.clone(),
                    }
                } else {
                    SlicerError::Internal(format!("converter failed: {message}"))
                }
            }
        },
        RunnerError::TimedOut {
            command,
            timeout_secs,
        } => SlicerError::Internal(format!("converter `{command}` timed out after {timeout_secs}s")),
        RunnerError::Spawn { command, source } => {
            SlicerError::Internal(format!("failed to launch converter `{command}`: {source}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_documented_extension() {
        assert_eq!(classify_extension("stl"), Some(SourceKind::Stl));
        assert_eq!(classify_extension("PNG"), Some(SourceKind::Image));
        assert_eq!(classify_extension("svg"), Some(SourceKind::Vector));
        assert_eq!(classify_extension("3mf"), Some(SourceKind::Mesh));
        assert_eq!(classify_extension("step"), Some(SourceKind::Cad));
        assert_eq!(classify_extension("txt"), None);
    }

    #[test]
    fn find_supported_entry_picks_first_in_filename_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_model.stl"), b"solid\n").unwrap();
        std::fs::write(dir.path().join("a_readme.txt"), b"notes").unwrap();

        let found = find_supported_entry(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "b_model.stl");
    }

    #[test]
    fn find_supported_entry_errors_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"notes").unwrap();
        assert!(matches!(
            find_supported_entry(dir.path()),
            Err(SlicerError::UnsupportedUpload)
        ));
    }

    #[tokio::test]
    async fn extracts_a_well_formed_archive() {
        let src_dir = tempfile::tempdir().unwrap();
        let archive_path = src_dir.path().join("upload.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.start_file("model.stl", options).unwrap();
            std::io::Write::write_all(&mut writer, b"solid test\nendsolid test\n").unwrap();
            writer.finish().unwrap();
        }

        let dest_dir = tempfile::tempdir().unwrap();
        extract_archive(&archive_path, dest_dir.path(), 10, 10 * 1024 * 1024)
            .await
            .unwrap();
        assert!(dest_dir.path().join("model.stl").exists());
    }

    #[tokio::test]
    async fn rejects_archives_past_the_entry_limit() {
        let src_dir = tempfile::tempdir().unwrap();
        let archive_path = src_dir.path().join("bomb.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for i in 0..5 {
                writer.start_file(format!("entry-{i}.txt"), options).unwrap();
                std::io::Write::write_all(&mut writer, b"x").unwrap();
            }
            writer.finish().unwrap();
        }

        let dest_dir = tempfile::tempdir().unwrap();
        let result = extract_archive(&archive_path, dest_dir.path(), 3, 10 * 1024 * 1024).await;
        assert!(matches!(result, Err(SlicerError::ArchiveRejected { .. })));
    }

    #[test]
    fn classifies_converter_exit_codes() {
        let err = RunnerError::NonZeroExit {
            command: "image-to-mesh in.png".to_string(),
            status: 2,
            message: "bad geometry".to_string(),
        };
        assert!(matches!(
            classify_converter_error(&err),
            SlicerError::InvalidSourceGeometry { .. }
        ));
    }

    #[test]
    fn classifies_unknown_exit_codes_by_hint_or_internal() {
        let hinted = RunnerError::NonZeroExit {
            command: "cad-to-mesh in.step".to_string(),
            status: 1,
            message: "CAD import failed: empty scene".to_string(),
        };
        assert!(matches!(
            classify_converter_error(&hinted),
            SlicerError::InvalidSourceGeometry { .. }
        ));

        let unknown = RunnerError::NonZeroExit {
            command: "cad-to-mesh in.step".to_string(),
            status: 1,
            message: "segmentation fault".to_string(),
        };
        assert!(matches!(
            classify_converter_error(&unknown),
            SlicerError::Internal(_)
        ));
    }
}
