//! VPNKit commands: artifact fetching, the four provisioning verbs, and the
//! relay process itself.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::download::Downloader;
use crate::extract::Extractor;
use crate::output::{print_info, print_success};
use crate::vpnkit::artifacts::{self, ArtifactFetcher};
use crate::vpnkit::reconcile::{self, EtcPaths};
use crate::vpnkit::relay::RelayRunner;
use crate::vpnkit::VpnkitProvisioner;

use super::CommandContext;

/// VPNKit commands.
#[derive(Debug, Args)]
pub struct VpnkitCommand {
    #[command(subcommand)]
    command: VpnkitSubcommand,
}

#[derive(Debug, Subcommand)]
enum VpnkitSubcommand {
    /// Download relay artifacts and generate scripts into the program dir.
    Fetch(DirArgs),

    /// Copy the relay files into a distro (requires a prior fetch).
    Install(DistroDirArgs),

    /// Remove the relay files from a distro (also unconfigures DNS).
    Uninstall(DistroDirArgs),

    /// Point a distro's DNS at the relay gateway.
    Configure(DistroArgs),

    /// Revert a distro's DNS configuration.
    Unconfigure(DistroArgs),

    /// Start the relay process for a distro.
    Start(StartArgs),
}

#[derive(Debug, Args)]
struct DirArgs {
    /// VPNKit program directory.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DistroDirArgs {
    /// Distribution name.
    distro: String,

    /// VPNKit program directory.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DistroArgs {
    /// Distribution name.
    distro: String,
}

#[derive(Debug, Args)]
struct StartArgs {
    /// Distribution name.
    distro: String,

    /// Spawn the relay into a new console window instead of blocking.
    #[arg(long)]
    detach: bool,

    /// Kill a pre-existing relay process without prompting.
    #[arg(long, short = 'y')]
    yes: bool,
}

impl VpnkitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            VpnkitSubcommand::Fetch(args) => {
                let dir = ctx.program_dir(args.dir)?;
                let fetcher =
                    ArtifactFetcher::new(Downloader::new()?, Extractor::new(ctx.seven_zip()));

                let fetched = fetcher.fetch_all(&dir).await?;
                artifacts::write_generated(&dir)?;

                if fetched.is_empty() {
                    print_info("All artifacts already present; regenerated scripts");
                } else {
                    print_success(&format!(
                        "Fetched {} into {}",
                        fetched.join(", "),
                        dir.display()
                    ));
                }
                Ok(())
            }
            VpnkitSubcommand::Install(args) => {
                let dir = ctx.program_dir(args.dir)?;
                let provisioner = VpnkitProvisioner::new(ctx.launcher(), dir);
                provisioner.install(&args.distro).await?;
                print_success(&format!(
                    "Relay installed into {}; run `wslforge vpnkit configure {}` next",
                    args.distro, args.distro
                ));
                Ok(())
            }
            VpnkitSubcommand::Uninstall(args) => {
                let dir = ctx.program_dir(args.dir)?;
                let provisioner = VpnkitProvisioner::new(ctx.launcher(), dir);
                provisioner.uninstall(&args.distro).await?;
                print_success(&format!("Relay removed from {}", args.distro));
                Ok(())
            }
            VpnkitSubcommand::Configure(args) => {
                let etc = EtcPaths::for_distro(&args.distro);
                reconcile::configure(&etc)
                    .with_context(|| format!("failed to configure DNS in {}", args.distro))?;
                print_success(&format!("DNS in {} now points at the relay", args.distro));
                Ok(())
            }
            VpnkitSubcommand::Unconfigure(args) => {
                let etc = EtcPaths::for_distro(&args.distro);
                reconcile::unconfigure(&etc)
                    .with_context(|| format!("failed to unconfigure DNS in {}", args.distro))?;
                print_success(&format!("DNS configuration reverted in {}", args.distro));
                Ok(())
            }
            VpnkitSubcommand::Start(args) => {
                let runner = RelayRunner::new(ctx.wsl_exe());
                runner.start(&args.distro, args.detach, args.yes).await
            }
        }
    }
}
