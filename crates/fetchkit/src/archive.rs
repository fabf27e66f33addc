//! Unpacking archives into an existing directory
//!
//! Archives are unpacked into a staging directory inside the destination
//! first, then merged entry by entry. A colliding file is preserved unless
//! `force` is set; with `force` it is replaced when its content differs
//! under the configured hash, or unconditionally when no hash is set.

use crate::error::{Error, Result};
use crate::hash::HashType;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
    /// A single gzip-compressed file
    Gz,
}

impl ArchiveFormat {
    /// Detect the format from a file name
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".gz") {
            Some(Self::Gz)
        } else {
            None
        }
    }
}

/// What a merge did to the destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files that did not exist before
    pub created: Vec<PathBuf>,
    /// Existing files overwritten under `force`
    pub replaced: Vec<PathBuf>,
    /// Existing files left alone
    pub preserved: Vec<PathBuf>,
}

impl ExtractReport {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.replaced.is_empty()
    }
}

/// Unpacks archives with a collision policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extractor {
    pub force: bool,
    /// Hash used to decide whether a colliding file differs
    pub hash_type: Option<HashType>,
}

impl Extractor {
    pub fn new(force: bool, hash_type: Option<HashType>) -> Self {
        Self { force, hash_type }
    }

    /// Unpack `archive` into `destination`, which must be a directory
    pub fn extract(&self, archive: &Path, destination: &Path) -> Result<ExtractReport> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = ArchiveFormat::detect(&name).ok_or_else(|| Error::UnsupportedArchive(name.clone()))?;

        let staging = tempfile::Builder::new()
            .prefix(".unarchive-")
            .tempdir_in(destination)
            .map_err(|e| Error::io(destination, e))?;

        log::info!("unpacking {} into {}", archive.display(), destination.display());
        unpack(format, archive, &name, staging.path())?;
        self.merge(staging.path(), destination)
    }

    fn merge(&self, staging: &Path, destination: &Path) -> Result<ExtractReport> {
        let mut report = ExtractReport::default();

        for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Archive(e.to_string()))?;
            let Ok(relative) = entry.path().strip_prefix(staging) else {
                continue;
            };
            let target = destination.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
                continue;
            }

            if fs::symlink_metadata(&target).is_err() {
                move_into_place(entry.path(), &target)?;
                report.created.push(target);
            } else if self.should_replace(entry.path(), &target)? {
                if target.is_dir() {
                    fs::remove_dir_all(&target).map_err(|e| Error::io(&target, e))?;
                }
                move_into_place(entry.path(), &target)?;
                report.replaced.push(target);
            } else {
                log::debug!("preserving existing {}", target.display());
                report.preserved.push(target);
            }
        }
        Ok(report)
    }

    fn should_replace(&self, incoming: &Path, existing: &Path) -> Result<bool> {
        if !self.force {
            return Ok(false);
        }
        let Some(hash_type) = self.hash_type else {
            return Ok(true);
        };
        if !existing.is_file() {
            return Ok(true);
        }
        Ok(hash_type.digest_file(incoming)? != hash_type.digest_file(existing)?)
    }
}

fn unpack(format: ArchiveFormat, archive: &Path, name: &str, into: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let reader = BufReader::new(file);

    match format {
        ArchiveFormat::Tar => tar::Archive::new(reader)
            .unpack(into)
            .map_err(|e| Error::Archive(e.to_string())),
        ArchiveFormat::TarGz => tar::Archive::new(GzDecoder::new(reader))
            .unpack(into)
            .map_err(|e| Error::Archive(e.to_string())),
        ArchiveFormat::Zip => {
            zip::ZipArchive::new(reader)?.extract(into)?;
            Ok(())
        }
        ArchiveFormat::Gz => {
            let stem = name
                .get(..name.len().saturating_sub(3))
                .filter(|s| !s.is_empty())
                .unwrap_or("unpacked");
            let out_path = into.join(stem);
            let mut out = File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
            io::copy(&mut GzDecoder::new(reader), &mut out)
                .map_err(|e| Error::Archive(e.to_string()))?;
            Ok(())
        }
    }
}

/// Rename, replacing a file at `target`
fn move_into_place(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::rename(from, to).map_err(|e| Error::io(to, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn targz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        {
            let mut builder = tar::Builder::new(&mut encoder);
            for (path, data) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, path, *data).unwrap();
            }
            builder.finish().unwrap();
        }
        encoder.finish().unwrap()
    }

    fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_detect() {
        assert_eq!(ArchiveFormat::detect("a.tar.gz"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("a.TGZ"), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect("a.tar"), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::detect("a.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::detect("a.txt.gz"), Some(ArchiveFormat::Gz));
        assert_eq!(ArchiveFormat::detect("a.rar"), None);
    }

    #[test]
    fn test_extract_targz() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let archive = write_archive(
            src.path(),
            "app.tar.gz",
            &targz(&[("bin/app", b"binary"), ("README", b"docs")]),
        );

        let report = Extractor::default().extract(&archive, dest.path()).unwrap();
        assert!(report.changed());
        assert_eq!(report.created.len(), 2);
        assert_eq!(fs::read(dest.path().join("bin/app")).unwrap(), b"binary");

        let leftovers: Vec<_> = fs::read_dir(dest.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".unarchive-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_collision_preserved_without_force() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("README"), "mine").unwrap();
        let archive = write_archive(src.path(), "a.tar.gz", &targz(&[("README", b"theirs")]));

        let report = Extractor::default().extract(&archive, dest.path()).unwrap();
        assert_eq!(report.preserved, vec![dest.path().join("README")]);
        assert!(!report.changed());
        assert_eq!(fs::read_to_string(dest.path().join("README")).unwrap(), "mine");
    }

    #[test]
    fn test_collision_replaced_with_force() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("same"), "same").unwrap();
        fs::write(dest.path().join("diff"), "old").unwrap();
        let archive = write_archive(
            src.path(),
            "a.tar.gz",
            &targz(&[("same", b"same"), ("diff", b"new")]),
        );

        let report = Extractor::new(true, Some(HashType::Sha256))
            .extract(&archive, dest.path())
            .unwrap();
        assert_eq!(report.replaced, vec![dest.path().join("diff")]);
        assert_eq!(report.preserved, vec![dest.path().join("same")]);
        assert_eq!(fs::read_to_string(dest.path().join("diff")).unwrap(), "new");
    }

    #[test]
    fn test_extract_zip() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let path = src.path().join("a.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
            zip.start_file("dir/file.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"zipped").unwrap();
            zip.finish().unwrap();
        }

        Extractor::default().extract(&path, dest.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dest.path().join("dir/file.txt")).unwrap(),
            "zipped"
        );
    }

    #[test]
    fn test_extract_single_gz() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"plain").unwrap();
        let archive = write_archive(src.path(), "notes.txt.gz", &encoder.finish().unwrap());

        Extractor::default().extract(&archive, dest.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dest.path().join("notes.txt")).unwrap(),
            "plain"
        );
    }

    #[test]
    fn test_unsupported_format() {
        let dest = tempfile::tempdir().unwrap();
        let err = Extractor::default()
            .extract(Path::new("/tmp/a.rar"), dest.path())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArchive(_)));
    }
}
