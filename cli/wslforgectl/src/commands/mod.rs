//! CLI commands.

mod distro;
mod vpnkit;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::output::OutputFormat;
use crate::wsl::WslLauncher;

/// wslforge - sideload WSL distributions and provision the VPNKit relay.
#[derive(Debug, Parser)]
#[command(name = "wslforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Override the path to the WSL launcher binary.
    #[arg(long, global = true, env = "WSLFORGE_WSL_EXE")]
    wsl_exe: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage WSL distributions (sideload, lifecycle, registration).
    Distro(distro::DistroCommand),

    /// Provision and operate the VPNKit network relay.
    Vpnkit(vpnkit::VpnkitCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let config = Config::load()?;

        let ctx = CommandContext {
            config,
            format,
            wsl_exe: self.wsl_exe,
        };

        match self.command {
            Commands::Distro(cmd) => cmd.run(ctx).await,
            Commands::Vpnkit(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("wslforge {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
    wsl_exe: Option<PathBuf>,
}

impl CommandContext {
    /// Get a WSL launcher handle, preferring flag over config.
    pub fn launcher(&self) -> WslLauncher {
        WslLauncher::new(self.wsl_exe.clone().or_else(|| self.config.wsl_exe.clone()))
    }

    /// Resolve the WSL launcher path override, if any.
    pub fn wsl_exe(&self) -> Option<PathBuf> {
        self.wsl_exe.clone().or_else(|| self.config.wsl_exe.clone())
    }

    /// Resolve the VPNKit program directory, preferring flag over config
    /// over the per-user default.
    pub fn program_dir(&self, flag: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = flag.or_else(|| self.config.program_dir.clone()) {
            return Ok(dir);
        }
        config::default_program_dir()
    }

    /// The external extractor override, if configured.
    pub fn seven_zip(&self) -> Option<PathBuf> {
        self.config.seven_zip.clone()
    }
}
