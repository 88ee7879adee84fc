//! Thin wrapper around the WSL launcher (`wsl.exe`).
//!
//! Every distro lifecycle operation defers to the launcher; this module only
//! builds argument lists, decodes its output (the launcher itself writes
//! UTF-16LE, commands run inside a distro write UTF-8), and turns non-zero
//! exits into errors carrying the exit code.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Launcher binary name resolved through PATH when no override is set.
pub const DEFAULT_WSL_EXE: &str = "wsl.exe";

/// Errors from launcher invocations.
#[derive(Debug, Error)]
pub enum WslError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("could not parse launcher output: {0}")]
    Parse(String),

    #[error("cannot translate path for WSL: {0}")]
    UnsupportedPath(String),
}

/// One row of `wsl.exe --list --verbose` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistroListing {
    pub name: String,
    pub state: String,
    pub version: u32,
    pub default: bool,
}

/// Handle to the WSL launcher binary.
#[derive(Debug, Clone)]
pub struct WslLauncher {
    exe: PathBuf,
}

impl WslLauncher {
    pub fn new(exe: Option<PathBuf>) -> Self {
        Self {
            exe: exe.unwrap_or_else(|| PathBuf::from(DEFAULT_WSL_EXE)),
        }
    }

    /// Run the launcher with `args`, returning decoded stdout.
    async fn run(&self, args: &[&str]) -> Result<String, WslError> {
        let command = format!("{} {}", self.exe.display(), args.join(" "));
        debug!(command = %command, "Running WSL launcher");

        let output = Command::new(&self.exe)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| WslError::Launch {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(WslError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: decode_output(&output.stderr).trim().to_string(),
            });
        }

        Ok(decode_output(&output.stdout))
    }

    /// Sideload a rootfs tarball as a new distribution.
    pub async fn import(
        &self,
        name: &str,
        dest: &Path,
        tarball: &Path,
        version: u32,
    ) -> Result<(), WslError> {
        let dest = dest.display().to_string();
        let tarball = tarball.display().to_string();
        let version = version.to_string();
        self.run(&["--import", name, &dest, &tarball, "--version", &version])
            .await
            .map(drop)
    }

    pub async fn unregister(&self, name: &str) -> Result<(), WslError> {
        self.run(&["--unregister", name]).await.map(drop)
    }

    pub async fn set_default(&self, name: &str) -> Result<(), WslError> {
        self.run(&["--set-default", name]).await.map(drop)
    }

    pub async fn set_version(&self, name: &str, version: u32) -> Result<(), WslError> {
        let version = version.to_string();
        self.run(&["--set-version", name, &version]).await.map(drop)
    }

    pub async fn terminate(&self, name: &str) -> Result<(), WslError> {
        self.run(&["--terminate", name]).await.map(drop)
    }

    /// Stop the shared VM and with it every running distro.
    pub async fn shutdown(&self) -> Result<(), WslError> {
        self.run(&["--shutdown"]).await.map(drop)
    }

    pub async fn list(&self) -> Result<Vec<DistroListing>, WslError> {
        let output = self.run(&["--list", "--verbose"]).await?;
        parse_distro_list(&output)
    }

    /// Run a shell command inside a distro, optionally as a specific user.
    pub async fn exec(
        &self,
        distro: &str,
        user: Option<&str>,
        command: &str,
    ) -> Result<String, WslError> {
        let mut args = vec!["-d", distro];
        if let Some(user) = user {
            args.extend(["--user", user]);
        }
        args.extend(["--", "sh", "-c", command]);
        self.run(&args).await
    }
}

/// Decode launcher output bytes.
///
/// `wsl.exe` itself emits UTF-16LE; anything produced by a command inside a
/// distro arrives as UTF-8. UTF-8 text never contains NUL bytes, so their
/// presence selects the UTF-16 path.
pub fn decode_output(bytes: &[u8]) -> String {
    if bytes.contains(&0) {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
            .trim_start_matches('\u{feff}')
            .to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Parse `wsl.exe --list --verbose` output.
///
/// The first non-empty line is the column header; a leading `*` marks the
/// default distribution.
pub fn parse_distro_list(output: &str) -> Result<Vec<DistroListing>, WslError> {
    let mut listings = Vec::new();
    let mut seen_header = false;

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if !seen_header {
            seen_header = true;
            continue;
        }

        let default = line.trim_start().starts_with('*');
        let line = line.trim_start().trim_start_matches('*');
        let mut fields = line.split_whitespace();

        let (name, state, version) = match (fields.next(), fields.next(), fields.next()) {
            (Some(name), Some(state), Some(version)) => (name, state, version),
            _ => return Err(WslError::Parse(format!("malformed list row: {line:?}"))),
        };

        let version = version
            .parse::<u32>()
            .map_err(|_| WslError::Parse(format!("bad version in list row: {line:?}")))?;

        listings.push(DistroListing {
            name: name.to_string(),
            state: state.to_string(),
            version,
            default,
        });
    }

    Ok(listings)
}

/// Translate a Windows drive path to its `/mnt/<drive>` location inside WSL.
///
/// Only drive-letter paths translate; UNC and relative paths are rejected.
pub fn windows_path_to_wsl(path: &Path) -> Result<String, WslError> {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut chars = raw.chars();

    let drive = chars.next();
    let colon = chars.next();
    match (drive, colon) {
        (Some(drive), Some(':')) if drive.is_ascii_alphabetic() => {
            let rest = chars.as_str().trim_start_matches('/');
            let drive = drive.to_ascii_lowercase();
            if rest.is_empty() {
                Ok(format!("/mnt/{drive}"))
            } else {
                Ok(format!("/mnt/{drive}/{rest}"))
            }
        }
        _ => Err(WslError::UnsupportedPath(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn decodes_utf16le_launcher_output() {
        let bytes = utf16le("Ubuntu\r\n");
        assert_eq!(decode_output(&bytes), "Ubuntu\r\n");
    }

    #[test]
    fn decodes_utf16le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16le("Debian"));
        assert_eq!(decode_output(&bytes), "Debian");
    }

    #[test]
    fn decodes_utf8_distro_output() {
        assert_eq!(decode_output(b"uid=0(root)\n"), "uid=0(root)\n");
    }

    #[test]
    fn parses_verbose_list() {
        let output = "  NAME      STATE           VERSION\r\n\
                      * Ubuntu    Running         2\r\n\
                        Debian    Stopped         2\r\n\
                        Arch      Stopped         1\r\n";

        let listings = parse_distro_list(output).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(
            listings[0],
            DistroListing {
                name: "Ubuntu".to_string(),
                state: "Running".to_string(),
                version: 2,
                default: true,
            }
        );
        assert!(!listings[1].default);
        assert_eq!(listings[2].version, 1);
    }

    #[test]
    fn empty_list_yields_no_rows() {
        let output = "  NAME      STATE           VERSION\r\n";
        assert!(parse_distro_list(output).unwrap().is_empty());
    }

    #[test]
    fn malformed_row_is_a_parse_error() {
        let output = "  NAME      STATE           VERSION\r\n  Ubuntu\r\n";
        assert!(matches!(
            parse_distro_list(output),
            Err(WslError::Parse(_))
        ));
    }

    #[test]
    fn translates_drive_paths() {
        assert_eq!(
            windows_path_to_wsl(Path::new(r"C:\Tools\vpnkit")).unwrap(),
            "/mnt/c/Tools/vpnkit"
        );
        assert_eq!(
            windows_path_to_wsl(Path::new("D:/data")).unwrap(),
            "/mnt/d/data"
        );
        assert_eq!(windows_path_to_wsl(Path::new("C:")).unwrap(), "/mnt/c");
    }

    #[test]
    fn rejects_unc_and_relative_paths() {
        assert!(windows_path_to_wsl(Path::new(r"\\wsl$\Ubuntu\etc")).is_err());
        assert!(windows_path_to_wsl(Path::new("relative/path")).is_err());
    }
}
