//! Archive extraction for rootfs images.
//!
//! Vendor rootfs downloads arrive in nested wrappers (`.tar.gz`, `.tar.xz`,
//! zips containing tarballs). Gzip layers unpack natively; every other
//! format falls back to an external 7-Zip binary, the same tool the rest of
//! the WSL sideloading ecosystem leans on. Layers are peeled until a plain
//! tarball remains, which is what `wsl.exe --import` accepts.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info};

/// Refuse to peel more wrapper layers than this.
const MAX_NESTING: usize = 4;

/// Errors from extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unrecognized archive format: {0}")]
    Unrecognized(PathBuf),

    #[error("archive nesting too deep in {0}")]
    TooDeep(PathBuf),

    #[error("failed to launch `{command}`: {source}")]
    ExtractorLaunch {
        command: String,
        source: io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    ExtractorFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("archive {0} produced no rootfs tarball")]
    NoTarball(PathBuf),

    #[error("archive {archive} does not contain {member}")]
    MissingMember { archive: PathBuf, member: String },
}

/// Recognized archive container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    Gzip,
    Xz,
    Zip,
    Unknown,
}

/// Identify an archive container from its leading bytes.
pub fn detect_kind(bytes: &[u8]) -> ArchiveKind {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        ArchiveKind::Gzip
    } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        ArchiveKind::Xz
    } else if bytes.starts_with(b"PK\x03\x04") {
        ArchiveKind::Zip
    } else if bytes.len() > 262 && &bytes[257..262] == b"ustar" {
        ArchiveKind::Tar
    } else {
        ArchiveKind::Unknown
    }
}

fn sniff_kind(path: &Path) -> Result<ArchiveKind, ExtractError> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 512];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(detect_kind(&header[..filled]))
}

/// Extractor with an optional external 7-Zip fallback.
pub struct Extractor {
    seven_zip: PathBuf,
}

impl Extractor {
    pub fn new(seven_zip: Option<PathBuf>) -> Self {
        Self {
            seven_zip: seven_zip.unwrap_or_else(|| PathBuf::from("7z")),
        }
    }

    /// Peel wrapper layers off `src` until a tarball remains.
    ///
    /// Intermediate files land in `work_dir`; the caller owns its cleanup
    /// (a scoped temp dir in practice, so cleanup happens even on failure).
    pub fn extract_rootfs(&self, src: &Path, work_dir: &Path) -> Result<PathBuf, ExtractError> {
        let mut current = src.to_path_buf();

        for depth in 0..MAX_NESTING {
            match sniff_kind(&current)? {
                ArchiveKind::Tar => {
                    info!(tarball = %current.display(), "Rootfs tarball ready");
                    return Ok(current);
                }
                ArchiveKind::Gzip => {
                    current = self.gunzip(&current, work_dir, depth)?;
                }
                ArchiveKind::Xz | ArchiveKind::Zip => {
                    current = self.seven_zip_extract(&current, work_dir, depth)?;
                }
                ArchiveKind::Unknown => {
                    return Err(ExtractError::Unrecognized(current));
                }
            }
        }

        Err(ExtractError::TooDeep(src.to_path_buf()))
    }

    fn gunzip(&self, src: &Path, work_dir: &Path, depth: usize) -> Result<PathBuf, ExtractError> {
        // An extensionless source has stem == name; naming by stem could then
        // point dest at src itself and truncate it mid-read.
        let inner_name = match src.file_stem() {
            Some(stem) if src.file_name() != Some(stem) => stem.to_os_string(),
            _ => format!("layer{depth}").into(),
        };
        let dest = work_dir.join(inner_name);

        debug!(src = %src.display(), dest = %dest.display(), "Decompressing gzip layer");

        let mut decoder = GzDecoder::new(File::open(src)?);
        let mut out = File::create(&dest)?;
        io::copy(&mut decoder, &mut out)?;

        Ok(dest)
    }

    /// Extract `member` out of a single archive layer.
    ///
    /// Unlike [`extract_rootfs`](Self::extract_rootfs) this does not peel
    /// further: the member is the final payload, whatever its format.
    pub fn extract_member(
        &self,
        src: &Path,
        work_dir: &Path,
        member: &str,
    ) -> Result<PathBuf, ExtractError> {
        let out_dir = work_dir.join("members");
        self.run_seven_zip(src, &out_dir)?;

        let path = out_dir.join(member);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ExtractError::MissingMember {
                archive: src.to_path_buf(),
                member: member.to_string(),
            })
        }
    }

    /// Extract one layer with the external 7-Zip binary and pick the
    /// resulting payload: a tarball if one appears, otherwise the single
    /// extracted file.
    fn seven_zip_extract(
        &self,
        src: &Path,
        work_dir: &Path,
        depth: usize,
    ) -> Result<PathBuf, ExtractError> {
        let out_dir = work_dir.join(format!("layer{depth}"));
        self.run_seven_zip(src, &out_dir)?;
        pick_payload(&out_dir).ok_or_else(|| ExtractError::NoTarball(src.to_path_buf()))
    }

    fn run_seven_zip(&self, src: &Path, out_dir: &Path) -> Result<(), ExtractError> {
        std::fs::create_dir_all(out_dir)?;

        let command = format!(
            "{} x -y -o{} {}",
            self.seven_zip.display(),
            out_dir.display(),
            src.display()
        );
        debug!(command = %command, "Running external extractor");

        let output = Command::new(&self.seven_zip)
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", out_dir.display()))
            .arg(src)
            .output()
            .map_err(|source| ExtractError::ExtractorLaunch {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::ExtractorFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Choose the extracted payload from a layer directory: prefer a `.tar`
/// entry, else a lone file.
fn pick_payload(dir: &Path) -> Option<PathBuf> {
    let entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    entries
        .iter()
        .find(|path| path.extension().is_some_and(|ext| ext == "tar"))
        .cloned()
        .or_else(|| {
            if entries.len() == 1 {
                Some(entries[0].clone())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_gzip_magic() {
        assert_eq!(detect_kind(&[0x1f, 0x8b, 0x08]), ArchiveKind::Gzip);
    }

    #[test]
    fn detects_xz_magic() {
        assert_eq!(
            detect_kind(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]),
            ArchiveKind::Xz
        );
    }

    #[test]
    fn detects_zip_magic() {
        assert_eq!(detect_kind(b"PK\x03\x04rest"), ArchiveKind::Zip);
    }

    #[test]
    fn detects_tar_by_ustar_marker() {
        let mut header = vec![0u8; 512];
        header[257..262].copy_from_slice(b"ustar");
        assert_eq!(detect_kind(&header), ArchiveKind::Tar);
    }

    #[test]
    fn short_or_plain_bytes_are_unknown() {
        assert_eq!(detect_kind(b"hello"), ArchiveKind::Unknown);
        assert_eq!(detect_kind(&[]), ArchiveKind::Unknown);
    }

    #[test]
    fn peels_gzip_down_to_tarball() {
        let dir = tempfile::tempdir().unwrap();

        // Build a tiny tarball, then gzip it.
        let tar_path = dir.path().join("rootfs.tar");
        {
            let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
            let mut header = tar::Header::new_ustar();
            header.set_path("etc/hostname").unwrap();
            header.set_size(4);
            header.set_cksum();
            builder.append(&header, &b"dev\n"[..]).unwrap();
            builder.finish().unwrap();
        }

        let gz_path = dir.path().join("rootfs.tar.gz");
        {
            let mut encoder = flate2::write::GzEncoder::new(
                File::create(&gz_path).unwrap(),
                flate2::Compression::default(),
            );
            encoder
                .write_all(&std::fs::read(&tar_path).unwrap())
                .unwrap();
            encoder.finish().unwrap();
        }

        let work = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(None);
        let result = extractor.extract_rootfs(&gz_path, work.path()).unwrap();

        assert_eq!(result.file_name().unwrap(), "rootfs.tar");
        assert_eq!(sniff_kind(&result).unwrap(), ArchiveKind::Tar);
    }

    #[test]
    fn plain_tarball_passes_through_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("image.tar");
        {
            let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
            let mut header = tar::Header::new_ustar();
            header.set_path("bin/sh").unwrap();
            header.set_size(0);
            header.set_cksum();
            builder.append(&header, &b""[..]).unwrap();
            builder.finish().unwrap();
        }

        let work = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(None);
        let result = extractor.extract_rootfs(&tar_path, work.path()).unwrap();
        assert_eq!(result, tar_path);
    }

    #[test]
    fn extensionless_gzip_does_not_clobber_its_source() {
        let dir = tempfile::tempdir().unwrap();

        let tar_path = dir.path().join("inner.tar");
        {
            let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
            let mut header = tar::Header::new_ustar();
            header.set_path("etc/hostname").unwrap();
            header.set_size(4);
            header.set_cksum();
            builder.append(&header, &b"dev\n"[..]).unwrap();
            builder.finish().unwrap();
        }

        // Gzip wrapper with no extension, placed inside the work dir itself.
        let gz_path = dir.path().join("rootfs");
        {
            let mut encoder = flate2::write::GzEncoder::new(
                File::create(&gz_path).unwrap(),
                flate2::Compression::default(),
            );
            encoder
                .write_all(&std::fs::read(&tar_path).unwrap())
                .unwrap();
            encoder.finish().unwrap();
        }
        let gz_bytes = std::fs::read(&gz_path).unwrap();

        let extractor = Extractor::new(None);
        let result = extractor.extract_rootfs(&gz_path, dir.path()).unwrap();

        assert_ne!(result, gz_path);
        assert_eq!(sniff_kind(&result).unwrap(), ArchiveKind::Tar);
        // The source survives untouched.
        assert_eq!(std::fs::read(&gz_path).unwrap(), gz_bytes);
    }

    #[test]
    fn garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-archive.bin");
        std::fs::write(&path, b"definitely not an archive").unwrap();

        let work = tempfile::tempdir().unwrap();
        let extractor = Extractor::new(None);
        assert!(matches!(
            extractor.extract_rootfs(&path, work.path()),
            Err(ExtractError::Unrecognized(_))
        ));
    }
}
