use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::{GzDecoder, MultiGzDecoder};
use tar::Archive;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::JgiError;

/// Compressed formats recognized by filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Gzip,
    Zip,
}

impl ArchiveKind {
    pub fn detect(filename: &str) -> Option<Self> {
        if filename.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else if filename.ends_with(".gz") {
            Some(Self::Gzip)
        } else if filename.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::TarGz => ".tar.gz",
            Self::Gzip => ".gz",
            Self::Zip => ".zip",
        }
    }
}

#[derive(Debug, Default)]
pub struct DecompressReport {
    /// Paths produced by decompression.
    pub extracted: Vec<Utf8PathBuf>,
    /// Files left alone because their suffix is not an archive.
    pub skipped: Vec<Utf8PathBuf>,
    pub failed: Vec<JgiError>,
}

/// Decompresses each file in place; one failure does not stop the rest.
pub fn decompress_all(
    paths: &[Utf8PathBuf],
    keep_original: bool,
    sink: &dyn ProgressSink,
) -> DecompressReport {
    let mut report = DecompressReport::default();
    for path in paths {
        match decompress(path, keep_original) {
            Ok(produced) => {
                sink.event(ProgressEvent {
                    message: format!("Decompressed '{path}'"),
                    elapsed: None,
                });
                report.extracted.extend(produced);
            }
            Err(JgiError::UnsupportedArchive(name)) => {
                sink.event(ProgressEvent {
                    message: format!("Skipped decompression for '{name}'"),
                    elapsed: None,
                });
                report.skipped.push(path.clone());
            }
            Err(err) => {
                warn!(%path, error = %err, "decompression failed");
                report.failed.push(err);
            }
        }
    }
    report
}

/// Decompresses one file next to itself and returns what it produced.
///
/// The source is removed afterwards unless `keep_original` is set; it is
/// never removed when extraction fails.
pub fn decompress(path: &Utf8Path, keep_original: bool) -> Result<Vec<Utf8PathBuf>, JgiError> {
    let filename = path.file_name().unwrap_or(path.as_str());
    let kind = ArchiveKind::detect(filename)
        .ok_or_else(|| JgiError::UnsupportedArchive(filename.to_string()))?;
    let stem = filename.strip_suffix(kind.suffix()).unwrap_or(filename);
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));

    let produced = match kind {
        ArchiveKind::TarGz => extract_tar_gz(path, parent, stem)?,
        ArchiveKind::Gzip => vec![gunzip(path, &parent.join(stem))?],
        ArchiveKind::Zip => {
            let target = parent.join(stem);
            extract_zip(path.as_std_path(), target.as_std_path())
                .map_err(|message| failure(path, message))?;
            vec![target]
        }
    };

    if !keep_original {
        fs::remove_file(path.as_std_path()).map_err(|err| failure(path, err.to_string()))?;
        debug!(%path, "removed compressed original");
    }
    Ok(produced)
}

/// Multi-member archives unpack into a folder named after the archive.
fn extract_tar_gz(
    path: &Utf8Path,
    parent: &Utf8Path,
    stem: &str,
) -> Result<Vec<Utf8PathBuf>, JgiError> {
    let members = tar_members(path.as_std_path()).map_err(|err| failure(path, err.to_string()))?;
    let target = if members.len() > 1 {
        let dir = parent.join(stem);
        fs::create_dir_all(dir.as_std_path()).map_err(|err| failure(path, err.to_string()))?;
        dir
    } else {
        parent.to_path_buf()
    };

    let file = fs::File::open(path.as_std_path()).map_err(|err| failure(path, err.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(target.as_std_path())
        .map_err(|err| failure(path, err.to_string()))?;

    if members.len() > 1 {
        return Ok(vec![target]);
    }
    Ok(members
        .into_iter()
        .filter_map(|member| Utf8PathBuf::from_path_buf(member).ok())
        .map(|member| target.join(member))
        .collect())
}

fn tar_members(path: &Path) -> io::Result<Vec<PathBuf>> {
    let file = fs::File::open(path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut members = Vec::new();
    for entry in archive.entries()? {
        members.push(entry?.path()?.into_owned());
    }
    Ok(members)
}

fn gunzip(path: &Utf8Path, output: &Utf8Path) -> Result<Utf8PathBuf, JgiError> {
    let result = (|| -> io::Result<()> {
        let input = fs::File::open(path.as_std_path())?;
        let mut decoder = MultiGzDecoder::new(input);
        let mut out = fs::File::create(output.as_std_path())?;
        io::copy(&mut decoder, &mut out)?;
        Ok(())
    })();
    if let Err(err) = result {
        match fs::remove_file(output.as_std_path()) {
            Ok(()) => debug!(path = %output, "removed incomplete output"),
            Err(remove) if remove.kind() == io::ErrorKind::NotFound => {}
            Err(remove) => warn!(path = %output, error = %remove, "failed to remove incomplete output"),
        }
        return Err(failure(path, err.to_string()));
    }
    Ok(output.to_path_buf())
}

fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), String> {
    let file = fs::File::open(zip_path).map_err(|err| err.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|err| err.to_string())?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|err| err.to_string())?;
        let Some(relative) = entry.enclosed_name() else {
            return Err("zip entry path traversal detected".to_string());
        };
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path).map_err(|err| err.to_string())?;
            continue;
        }
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
        let mut outfile = fs::File::create(&entry_path).map_err(|err| err.to_string())?;
        io::copy(&mut entry, &mut outfile).map_err(|err| err.to_string())?;
    }
    Ok(())
}

fn failure(path: &Utf8Path, message: String) -> JgiError {
    JgiError::Decompress {
        path: path.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn workdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, dir)
    }

    fn write_gz(path: &Utf8Path, body: &[u8]) {
        let mut encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::fast());
        encoder.write_all(body).unwrap();
        encoder.finish().unwrap();
    }

    fn write_tar_gz(path: &Utf8Path, members: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn detects_kinds_by_suffix() {
        assert_eq!(ArchiveKind::detect("a.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("a.fasta.gz"), Some(ArchiveKind::Gzip));
        assert_eq!(ArchiveKind::detect("a.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("a.fasta"), None);
    }

    #[test]
    fn gunzip_strips_suffix_and_removes_original() {
        let (_temp, dir) = workdir();
        let gz = dir.join("genome.fasta.gz");
        write_gz(&gz, b">seq\nACGT\n");
        let produced = decompress(&gz, false).unwrap();
        assert_eq!(produced, vec![dir.join("genome.fasta")]);
        assert_eq!(fs::read(dir.join("genome.fasta")).unwrap(), b">seq\nACGT\n");
        assert!(!gz.exists());
    }

    #[test]
    fn keep_original_leaves_archive() {
        let (_temp, dir) = workdir();
        let gz = dir.join("genes.gff.gz");
        write_gz(&gz, b"##gff-version 3\n");
        decompress(&gz, true).unwrap();
        assert!(gz.exists());
        assert!(dir.join("genes.gff").exists());
    }

    #[test]
    fn multi_member_tarball_gets_its_own_folder() {
        let (_temp, dir) = workdir();
        let tarball = dir.join("bundle.tar.gz");
        write_tar_gz(&tarball, &[("a.txt", b"a"), ("b.txt", b"b")]);
        let produced = decompress(&tarball, false).unwrap();
        assert_eq!(produced, vec![dir.join("bundle")]);
        assert!(dir.join("bundle/a.txt").exists());
        assert!(dir.join("bundle/b.txt").exists());
    }

    #[test]
    fn single_member_tarball_unpacks_alongside() {
        let (_temp, dir) = workdir();
        let tarball = dir.join("one.tar.gz");
        write_tar_gz(&tarball, &[("only.txt", b"x")]);
        let produced = decompress(&tarball, false).unwrap();
        assert_eq!(produced, vec![dir.join("only.txt")]);
    }

    #[test]
    fn unsupported_suffix_is_skipped() {
        let (_temp, dir) = workdir();
        let plain = dir.join("readme.txt");
        fs::write(&plain, b"hi").unwrap();
        assert_matches!(decompress(&plain, false), Err(JgiError::UnsupportedArchive(_)));
        assert!(plain.exists());
    }

    #[test]
    fn corrupt_gzip_keeps_original() {
        let (_temp, dir) = workdir();
        let gz = dir.join("broken.gz");
        fs::write(&gz, b"not gzip").unwrap();
        assert_matches!(decompress(&gz, false), Err(JgiError::Decompress { .. }));
        assert!(gz.exists());
        assert!(!dir.join("broken").exists());
    }
}
