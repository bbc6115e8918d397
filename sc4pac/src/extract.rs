// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Archive extraction behind a trait seam. The built-in implementation
//! handles zip archives; entries are filtered by the per-asset
//! include/exclude patterns, and symbolic links are skipped.

use std::{
    io,
    path::{Path, PathBuf},
};

use fs_err as fs;
use glob::{MatchOptions, Pattern};
use log::debug;
use thiserror::Error;

/// Which archive paths an asset reference extracts. An empty include list
/// selects everything; excludes always win.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, Error> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches_with(path, MATCH_OPTIONS)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

/// Seam for archive codecs: unpack `archive` into `target`, honoring the
/// filter, and report the produced paths relative to `target`.
pub trait Extractor {
    fn extract(
        &self,
        archive: &Path,
        target: &Path,
        filter: &FileFilter,
    ) -> Result<Vec<PathBuf>, Error>;
}

/// The default codec for `.zip` asset archives
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(
        &self,
        archive: &Path,
        target: &Path,
        filter: &FileFilter,
    ) -> Result<Vec<PathBuf>, Error> {
        let file = fs::File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| wrap(archive, e))?;

        let mut produced = Vec::new();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| wrap(archive, e))?;

            // Guards against zip-slip entries escaping the target
            let Some(relative) = entry.enclosed_name() else {
                debug!("skipping unsafe archive entry: {:?}", entry.name());
                continue;
            };

            if entry.is_dir() {
                continue;
            }

            // S_IFLNK
            if entry.unix_mode().is_some_and(|mode| mode & 0o170000 == 0o120000) {
                debug!("skipping symlink in archive: {}", relative.display());
                continue;
            }

            let entry_path = relative.to_string_lossy().replace('\\', "/");
            if !filter.matches(&entry_path) {
                continue;
            }

            let dest = target.join(&relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut out = fs::File::create(&dest)?;
            io::copy(&mut entry, &mut out)?;

            produced.push(relative);
        }

        Ok(produced)
    }
}

fn wrap(archive: &Path, cause: zip::result::ZipError) -> Error {
    Error::Archive {
        archive: archive.to_owned(),
        cause,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("extraction of {archive:?} failed: {cause}")]
    Archive {
        archive: PathBuf,
        cause: zip::result::ZipError,
    },
    #[error("malformed filter pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(name.trim_end_matches('/'), options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn filter_semantics() {
        let filter = FileFilter::new(&["**/*.dat".into()], &["**/docs/*".into()]).unwrap();
        assert!(filter.matches("a/b/network.dat"));
        assert!(filter.matches("Network.DAT"));
        assert!(!filter.matches("a/docs/readme.dat"));
        assert!(!filter.matches("readme.txt"));

        let all = FileFilter::all();
        assert!(all.matches("anything/at/all"));
    }

    #[test]
    fn extracts_matching_entries_and_reports_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("asset.zip");
        write_zip(
            &archive,
            &[
                ("mod/", b"".as_slice()),
                ("mod/network.dat", b"dat content"),
                ("mod/readme.txt", b"docs"),
            ],
        );

        let target = dir.path().join("out");
        let produced = ZipExtractor
            .extract(
                &archive,
                &target,
                &FileFilter::new(&["**/*.dat".into()], &[]).unwrap(),
            )
            .unwrap();

        assert_eq!(produced, vec![PathBuf::from("mod/network.dat")]);
        assert_eq!(
            std::fs::read(target.join("mod/network.dat")).unwrap(),
            b"dat content"
        );
        assert!(!target.join("mod/readme.txt").exists());
    }

    #[test]
    fn empty_filter_extracts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("asset.zip");
        write_zip(&archive, &[("a.txt", b"a".as_slice()), ("b/c.txt", b"c")]);

        let target = dir.path().join("out");
        let produced = ZipExtractor
            .extract(&archive, &target, &FileFilter::all())
            .unwrap();

        assert_eq!(produced.len(), 2);
        assert!(target.join("b/c.txt").exists());
    }
}
