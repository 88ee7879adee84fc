//! VPNKit relay provisioning.
//!
//! Four named, independently re-runnable procedures drive two orthogonal
//! booleans per distro: {binaries-installed} x {dns-configured}.
//!
//! - installed + configured: fully working relay host
//! - configured only: DNS-only client (another distro runs the relay)
//! - installed only / neither: inert
//!
//! Transitions happen only through explicit user-invoked verbs; there is no
//! reconciliation loop. install/configure stay separate so the DNS half can
//! be applied to client distros on its own.

pub mod artifacts;
pub mod pkg;
pub mod reconcile;
pub mod relay;
pub mod templates;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::wsl::{windows_path_to_wsl, WslLauncher};

use pkg::PkgFamily;

/// The relay's single in-distro runtime dependency.
const RELAY_DEPENDENCY: &str = "socat";

/// Drives the install/uninstall half across the WSL exec boundary.
pub struct VpnkitProvisioner {
    wsl: WslLauncher,
    program_dir: PathBuf,
}

impl VpnkitProvisioner {
    pub fn new(wsl: WslLauncher, program_dir: PathBuf) -> Self {
        Self { wsl, program_dir }
    }

    /// Copy the relay files into `distro` and best-effort install the
    /// socket-relay dependency.
    ///
    /// Runs as root inside the distro: `/sbin` and `chown root:root` require
    /// it. Fails before mutating anything when the program directory is
    /// incomplete.
    pub async fn install(&self, distro: &str) -> Result<()> {
        let missing = artifacts::missing_install_files(&self.program_dir);
        if !missing.is_empty() {
            bail!(
                "program directory {} is missing {}; run `wslforge vpnkit fetch` first",
                self.program_dir.display(),
                missing.join(", ")
            );
        }

        let wsl_dir = windows_path_to_wsl(&self.program_dir)
            .context("program directory must be on a drive the distro can see")?;

        self.wsl
            .exec(
                distro,
                Some("root"),
                &format!("sh '{wsl_dir}/wsl-vpnkit-install' '{wsl_dir}'"),
            )
            .await?;
        info!(distro = %distro, "Relay files installed");

        // Best-effort: the relay cannot run without the dependency, but the
        // configuration files are independent of it.
        if let Err(err) = self.install_dependency(distro).await {
            warn!(
                distro = %distro,
                error = %err,
                "could not install {RELAY_DEPENDENCY}; install it manually before starting the relay"
            );
        }

        Ok(())
    }

    /// Revert install: unconfigure, then remove every installed file.
    ///
    /// Runs the program-directory copy of the uninstall script so it works
    /// even when the installed copy is already gone.
    pub async fn uninstall(&self, distro: &str) -> Result<()> {
        let wsl_dir = windows_path_to_wsl(&self.program_dir)
            .context("program directory must be on a drive the distro can see")?;

        self.wsl
            .exec(
                distro,
                Some("root"),
                &format!("sh '{wsl_dir}/wsl-vpnkit-uninstall'"),
            )
            .await?;
        info!(distro = %distro, "Relay files removed");
        Ok(())
    }

    async fn install_dependency(&self, distro: &str) -> Result<()> {
        let os_release = self
            .wsl
            .exec(distro, Some("root"), "cat /etc/os-release")
            .await?;

        let family = PkgFamily::detect(&os_release)
            .ok_or_else(|| anyhow::anyhow!("unrecognized package manager family"))?;

        self.wsl
            .exec(
                distro,
                Some("root"),
                &family.install_command(RELAY_DEPENDENCY),
            )
            .await?;
        info!(distro = %distro, family = ?family, "Installed {RELAY_DEPENDENCY}");
        Ok(())
    }
}
