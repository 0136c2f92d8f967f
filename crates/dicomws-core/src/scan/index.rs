//! Series Indexer: walks a directory tree and orders every placeable DICOM file.
//!
//! # Ordering
//!
//! Members are sorted by `(protocol_name, instance_key)`, both compared as
//! plain strings, ascending.  The sort is stable and the walk visits entries
//! in file-name order, so two scans of an unchanged tree produce identical
//! output, and ties keep their traversal order.
//!
//! The instance key is deliberately *not* parsed as a number or a time: the
//! ordering reproduces exactly what a string comparison of the source
//! attribute gives, even where that differs from acquisition order.
//!
//! # Failure policy
//!
//! One bad file never aborts a scan.  Files that do not classify are logged
//! and skipped.  The call only fails when the root itself cannot be read.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::SeriesMember;
use crate::scan::classify::classify;

/// Errors that fail a whole scan.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The scan root is missing, is not a directory, or cannot be listed.
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scans `root` recursively and returns its series members in sort order.
///
/// Nothing on disk is modified.  Directory symlinks are not followed; file
/// symlinks are classified through their target.
///
/// # Errors
///
/// Returns [`IndexError::DirectoryNotFound`] if `root` is missing, is not a
/// directory, or cannot be read.  A directory with no DICOM files yields an
/// empty list, not an error.
pub fn index(root: &Path) -> Result<Vec<SeriesMember>, IndexError> {
    ensure_readable_dir(root)?;

    let mut members = Vec::new();
    let mut skipped = 0_usize;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // An unreadable subdirectory is skipped like an unreadable file.
                warn!("skipping unreadable entry under {}: {err}", root.display());
                skipped += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() || !entry.path().is_file() {
            continue;
        }

        match classify(entry.path()) {
            Ok(member) => members.push(member),
            Err(err) if err.is_dicom() => {
                warn!("skipping {}: {err}", entry.path().display());
                skipped += 1;
            }
            Err(err) => {
                debug!("skipping {}: {err}", entry.path().display());
                skipped += 1;
            }
        }
    }

    sort_members(&mut members);

    info!(
        "indexed {}: {} series member(s), {} file(s) skipped",
        root.display(),
        members.len(),
        skipped
    );
    Ok(members)
}

/// Sorts members by `(protocol_name, instance_key)` as strings, keeping ties in place.
pub fn sort_members(members: &mut [SeriesMember]) {
    // `sort_by` is a stable merge sort.
    members.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

fn ensure_readable_dir(root: &Path) -> Result<(), IndexError> {
    let not_found = |source: io::Error| IndexError::DirectoryNotFound {
        path: root.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(root).map_err(not_found)?;
    if !metadata.is_dir() {
        return Err(not_found(io::Error::new(
            io::ErrorKind::NotFound,
            "path is not a directory",
        )));
    }
    // Listing the root up front distinguishes "cannot read the root" (fatal)
    // from "cannot read something below it" (skipped).
    std::fs::read_dir(root).map_err(not_found)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{write_dicom, FixtureImage};

    fn file_names(members: &[SeriesMember]) -> Vec<String> {
        members
            .iter()
            .map(|m| m.file_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn member(name: &str, protocol: &str, instance: &str) -> SeriesMember {
        SeriesMember {
            file_path: PathBuf::from(name),
            protocol_name: protocol.to_string(),
            instance_key: instance.to_string(),
            image_position: [0.0; 3],
            image_orientation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn test_index_orders_by_instance_within_protocol() {
        // Arrange: a.img has the later instance key, so it must come second
        let dir = tempfile::tempdir().unwrap();
        write_dicom(&dir.path().join("a.img"), &FixtureImage::slice("CT", "002")).unwrap();
        write_dicom(&dir.path().join("b.img"), &FixtureImage::slice("CT", "001")).unwrap();

        // Act
        let members = index(dir.path()).unwrap();

        // Assert
        assert_eq!(file_names(&members), vec!["b.img", "a.img"]);
    }

    #[test]
    fn test_index_groups_by_protocol_first() {
        let dir = tempfile::tempdir().unwrap();
        write_dicom(&dir.path().join("1.dcm"), &FixtureImage::slice("T2", "1")).unwrap();
        write_dicom(&dir.path().join("2.dcm"), &FixtureImage::slice("T1", "9")).unwrap();
        write_dicom(&dir.path().join("3.dcm"), &FixtureImage::slice("T1", "2")).unwrap();

        let members = index(dir.path()).unwrap();

        assert_eq!(file_names(&members), vec!["3.dcm", "2.dcm", "1.dcm"]);
    }

    #[test]
    fn test_index_compares_instance_keys_as_strings() {
        // "10" sorts before "9" as a string; numeric parsing would reverse them.
        let dir = tempfile::tempdir().unwrap();
        write_dicom(&dir.path().join("nine.dcm"), &FixtureImage::slice("CT", "9")).unwrap();
        write_dicom(&dir.path().join("ten.dcm"), &FixtureImage::slice("CT", "10")).unwrap();

        let members = index(dir.path()).unwrap();

        assert_eq!(file_names(&members), vec!["ten.dcm", "nine.dcm"]);
    }

    #[test]
    fn test_index_recurses_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("study").join("series");
        std::fs::create_dir_all(&nested).unwrap();
        write_dicom(&nested.join("deep.dcm"), &FixtureImage::slice("CT", "1")).unwrap();

        let members = index(dir.path()).unwrap();

        assert_eq!(members.len(), 1);
        assert_eq!(members[0].file_path, nested.join("deep.dcm"));
    }

    #[test]
    fn test_index_skips_unclassifiable_files() {
        let dir = tempfile::tempdir().unwrap();
        write_dicom(&dir.path().join("ok.dcm"), &FixtureImage::slice("CT", "1")).unwrap();
        write_dicom(
            &dir.path().join("nogeom.dcm"),
            &FixtureImage::slice("CT", "0").without_geometry(),
        )
        .unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("empty.dcm"), b"").unwrap();

        let members = index(dir.path()).unwrap();

        assert_eq!(file_names(&members), vec!["ok.dcm"]);
    }

    #[test]
    fn test_index_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        for (name, proto, inst) in [("x", "B", "1"), ("y", "A", "1"), ("z", "A", "1")] {
            write_dicom(&dir.path().join(name), &FixtureImage::slice(proto, inst)).unwrap();
        }

        let first = index(dir.path()).unwrap();
        let second = index(dir.path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_index_missing_root_is_directory_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let err = index(&missing).unwrap_err();

        assert!(matches!(err, IndexError::DirectoryNotFound { ref path, .. } if *path == missing));
    }

    #[test]
    fn test_index_file_root_is_directory_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.dcm");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(index(&file), Err(IndexError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_sort_members_keeps_ties_in_input_order() {
        // Arrange: three members share a key, interleaved with others
        let mut members = vec![
            member("tie-1", "CT", "5"),
            member("other", "AX", "1"),
            member("tie-2", "CT", "5"),
            member("last", "ZZ", "0"),
            member("tie-3", "CT", "5"),
        ];

        // Act
        sort_members(&mut members);

        // Assert
        let names: Vec<_> = members.iter().map(|m| m.file_path.to_str().unwrap()).collect();
        assert_eq!(names, vec!["other", "tie-1", "tie-2", "tie-3", "last"]);
    }

    #[test]
    fn test_sort_members_removing_others_preserves_relative_order() {
        let full = vec![
            member("c", "CT", "3"),
            member("n1", "MR", "1"),
            member("a", "CT", "1"),
            member("n2", "AX", "7"),
            member("b", "CT", "2"),
        ];
        let mut sorted_full = full.clone();
        sort_members(&mut sorted_full);
        let mut only_ct: Vec<_> = full.into_iter().filter(|m| m.protocol_name == "CT").collect();
        sort_members(&mut only_ct);

        let ct_in_full: Vec<_> = sorted_full
            .into_iter()
            .filter(|m| m.protocol_name == "CT")
            .collect();
        assert_eq!(ct_in_full, only_ct);
    }
}
