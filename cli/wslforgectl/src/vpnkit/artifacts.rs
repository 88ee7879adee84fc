//! Fetching third-party relay artifacts into the host program directory.
//!
//! The actual network bridging is implemented entirely by pre-built external
//! binaries; this module only downloads them, places them in the program
//! directory, and writes the generated scripts and config templates next to
//! them. Fetches are skipped for files already present, so the command is
//! re-runnable.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::download::Downloader;
use crate::extract::Extractor;

use super::templates;

/// Pinned wsl-vpnkit release.
pub const WSL_VPNKIT_TAG: &str = "v0.2.1";

/// Pinned npiperelay release.
pub const NPIPERELAY_TAG: &str = "v0.1.0";

/// How an artifact is obtained.
enum Source {
    /// Direct file download.
    File { url: String },
    /// A member inside a downloaded zip archive.
    ZipMember { url: String, member: &'static str },
}

struct Artifact {
    file_name: &'static str,
    source: Source,
}

fn artifact_set() -> Vec<Artifact> {
    vec![
        Artifact {
            file_name: "wsl-vpnkit",
            source: Source::File {
                url: format!(
                    "https://raw.githubusercontent.com/sakai135/wsl-vpnkit/{WSL_VPNKIT_TAG}/wsl-vpnkit"
                ),
            },
        },
        Artifact {
            file_name: "wsl-vpnkit.exe",
            source: Source::File {
                url: format!(
                    "https://github.com/sakai135/wsl-vpnkit/releases/download/{WSL_VPNKIT_TAG}/wsl-vpnkit.exe"
                ),
            },
        },
        Artifact {
            file_name: "vpnkit-tap-vsockd",
            source: Source::File {
                url: format!(
                    "https://github.com/sakai135/wsl-vpnkit/releases/download/{WSL_VPNKIT_TAG}/vpnkit-tap-vsockd"
                ),
            },
        },
        Artifact {
            file_name: "npiperelay.exe",
            source: Source::ZipMember {
                url: format!(
                    "https://github.com/jstarks/npiperelay/releases/download/{NPIPERELAY_TAG}/npiperelay_windows_amd64.zip"
                ),
                member: "npiperelay.exe",
            },
        },
    ]
}

/// Files the in-distro install step copies out of the program directory.
pub const INSTALL_FILES: [&str; 6] = [
    "wsl-vpnkit",
    "vpnkit-tap-vsockd",
    "wsl-vpnkit-install",
    "wsl-vpnkit-uninstall",
    "wsl-vpnkit-configure",
    "wsl-vpnkit-unconfigure",
];

/// Downloads artifacts and writes the generated files.
pub struct ArtifactFetcher {
    downloader: Downloader,
    extractor: Extractor,
}

impl ArtifactFetcher {
    pub fn new(downloader: Downloader, extractor: Extractor) -> Self {
        Self {
            downloader,
            extractor,
        }
    }

    /// Fetch every missing third-party artifact into `program_dir`.
    ///
    /// Returns the names actually downloaded.
    pub async fn fetch_all(&self, program_dir: &Path) -> Result<Vec<String>> {
        std::fs::create_dir_all(program_dir)
            .with_context(|| format!("failed to create {}", program_dir.display()))?;

        let mut fetched = Vec::new();

        for artifact in artifact_set() {
            let dest = program_dir.join(artifact.file_name);
            if dest.exists() {
                debug!(file = artifact.file_name, "Artifact already present, skipping");
                continue;
            }

            match artifact.source {
                Source::File { url } => {
                    self.downloader.fetch(&url, &dest, None).await?;
                }
                Source::ZipMember { url, member } => {
                    self.fetch_zip_member(&url, member, &dest).await?;
                }
            }

            info!(file = artifact.file_name, "Artifact fetched");
            fetched.push(artifact.file_name.to_string());
        }

        Ok(fetched)
    }

    async fn fetch_zip_member(&self, url: &str, member: &str, dest: &Path) -> Result<()> {
        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        let zip_path = scratch.path().join("artifact.zip");

        self.downloader.fetch(url, &zip_path, None).await?;
        let payload = self
            .extractor
            .extract_member(&zip_path, scratch.path(), member)
            .with_context(|| format!("failed to extract {member} from {url}"))?;

        std::fs::copy(&payload, dest)
            .with_context(|| format!("failed to place {member} at {}", dest.display()))?;
        Ok(())
    }
}

/// Write the generated scripts and config templates into `program_dir`.
///
/// Unconditional overwrite: the generated content is a pure function of this
/// tool's version, so regenerating is always safe.
pub fn write_generated(program_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(program_dir)
        .with_context(|| format!("failed to create {}", program_dir.display()))?;

    let files = [
        ("wsl-vpnkit-install", templates::install_script()?),
        ("wsl-vpnkit-uninstall", templates::uninstall_script()?),
        ("wsl-vpnkit-configure", templates::configure_script()?),
        ("wsl-vpnkit-unconfigure", templates::unconfigure_script()?),
        ("wsl.conf", templates::wsl_conf()),
        ("resolv.conf", templates::resolv_conf()),
    ];

    for (name, content) in files {
        let path = program_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(file = name, "Generated artifact written");
    }

    Ok(())
}

/// Check that every file the install step needs is present.
pub fn missing_install_files(program_dir: &Path) -> Vec<&'static str> {
    INSTALL_FILES
        .iter()
        .copied()
        .filter(|name| !program_dir.join(name).exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_generated_produces_the_full_set() {
        let dir = tempfile::tempdir().unwrap();
        write_generated(dir.path()).unwrap();

        for name in [
            "wsl-vpnkit-install",
            "wsl-vpnkit-uninstall",
            "wsl-vpnkit-configure",
            "wsl-vpnkit-unconfigure",
            "wsl.conf",
            "resolv.conf",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }

        assert_eq!(
            std::fs::read_to_string(dir.path().join("resolv.conf")).unwrap(),
            "nameserver 192.168.67.1\nnameserver 1.1.1.1\n"
        );
    }

    #[test]
    fn missing_install_files_reports_binaries_not_yet_fetched() {
        let dir = tempfile::tempdir().unwrap();
        write_generated(dir.path()).unwrap();

        let missing = missing_install_files(dir.path());
        // Generated scripts exist; the downloaded binaries do not.
        assert_eq!(missing, vec!["wsl-vpnkit", "vpnkit-tap-vsockd"]);
    }
}
