//! Distro commands: sideloading, lifecycle, and registration records.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use crate::download::{file_name_from_url, Downloader};
use crate::extract::Extractor;
use crate::output::{print_output, print_single, print_success, print_warning};
use crate::store::open_default_store;
use crate::wsl::{DistroListing, WslLauncher};

use super::CommandContext;

/// Distro commands.
#[derive(Debug, Args)]
pub struct DistroCommand {
    #[command(subcommand)]
    command: DistroSubcommand,
}

#[derive(Debug, Subcommand)]
enum DistroSubcommand {
    /// Sideload a rootfs image as a new distribution.
    Import(ImportArgs),

    /// List registered distributions.
    List,

    /// Remove a distribution and its filesystem.
    Unregister {
        /// Distribution name.
        name: String,
    },

    /// Make a distribution the default.
    SetDefault {
        /// Distribution name.
        name: String,
    },

    /// Convert a distribution between WSL versions.
    SetVersion {
        /// Distribution name.
        name: String,
        /// Target WSL version (1 or 2).
        version: u32,
    },

    /// Stop a running distribution.
    Terminate {
        /// Distribution name.
        name: String,
    },

    /// Stop the shared VM and all distributions.
    Shutdown,

    /// Show a distribution's registration record.
    Info {
        /// Distribution name.
        name: String,
    },

    /// Set a distribution's default user by UID.
    SetUser {
        /// Distribution name.
        name: String,
        /// Numeric UID of the new default user.
        uid: u32,
    },
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Name to register the distribution under.
    name: String,

    /// Rootfs source: an http(s) URL or a local archive path.
    #[arg(long)]
    from: String,

    /// Directory to hold the distribution's filesystem.
    #[arg(long)]
    dest: PathBuf,

    /// WSL version to import as.
    #[arg(long, default_value_t = 2)]
    version: u32,

    /// Create this user inside the distro and make it the default.
    #[arg(long)]
    user: Option<String>,

    /// Expected SHA-256 of the download (hex). Mismatch aborts the import.
    #[arg(long)]
    sha256: Option<String>,

    /// Make the imported distribution the default.
    #[arg(long)]
    set_default: bool,
}

impl DistroCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            DistroSubcommand::Import(args) => import(ctx, args).await,
            DistroSubcommand::List => list(ctx).await,
            DistroSubcommand::Unregister { name } => {
                ctx.launcher().unregister(&name).await?;
                print_success(&format!("Unregistered {name}"));
                Ok(())
            }
            DistroSubcommand::SetDefault { name } => {
                ctx.launcher().set_default(&name).await?;
                print_success(&format!("{name} is now the default distribution"));
                Ok(())
            }
            DistroSubcommand::SetVersion { name, version } => {
                ctx.launcher().set_version(&name, version).await?;
                print_success(&format!("{name} converted to WSL {version}"));
                Ok(())
            }
            DistroSubcommand::Terminate { name } => {
                ctx.launcher().terminate(&name).await?;
                print_success(&format!("Terminated {name}"));
                Ok(())
            }
            DistroSubcommand::Shutdown => {
                ctx.launcher().shutdown().await?;
                print_success("WSL VM stopped");
                Ok(())
            }
            DistroSubcommand::Info { name } => {
                let store = open_default_store()?;
                let record = store.get(&name)?;
                print_single(&record, ctx.format);
                Ok(())
            }
            DistroSubcommand::SetUser { name, uid } => {
                let mut store = open_default_store()?;
                store.set_default_uid(&name, uid)?;
                print_success(&format!("Default user of {name} set to uid {uid}"));
                Ok(())
            }
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct DistroRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "VERSION")]
    version: u32,
    #[tabled(rename = "DEFAULT")]
    default: bool,
}

impl From<DistroListing> for DistroRow {
    fn from(listing: DistroListing) -> Self {
        Self {
            name: listing.name,
            state: listing.state,
            version: listing.version,
            default: listing.default,
        }
    }
}

async fn list(ctx: CommandContext) -> Result<()> {
    let rows: Vec<DistroRow> = ctx
        .launcher()
        .list()
        .await?
        .into_iter()
        .map(DistroRow::from)
        .collect();
    print_output(&rows, ctx.format);
    Ok(())
}

async fn import(ctx: CommandContext, args: ImportArgs) -> Result<()> {
    let launcher = ctx.launcher();

    // Preconditions: nothing is mutated when these fail.
    match launcher.list().await {
        Ok(listings) => {
            if listings.iter().any(|l| l.name == args.name) {
                bail!("distribution {} is already registered", args.name);
            }
        }
        Err(err) => {
            // A host with zero distros makes the list call itself fail.
            warn!(error = %err, "could not list distributions; continuing");
        }
    }

    if args.dest.exists() {
        let occupied = std::fs::read_dir(&args.dest)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if occupied {
            bail!(
                "destination {} already exists and is not empty",
                args.dest.display()
            );
        }
    }

    // Scratch space for the download and extraction; removed on every exit
    // path, including failures.
    let work_dir = tempfile::tempdir().context("failed to create scratch directory")?;

    let source = if args.from.starts_with("http://") || args.from.starts_with("https://") {
        let file_name = file_name_from_url(&args.from, "rootfs.img");
        let dest = work_dir.path().join(file_name);
        Downloader::new()?
            .fetch(&args.from, &dest, args.sha256.as_deref())
            .await?;
        dest
    } else {
        let path = PathBuf::from(&args.from);
        if !path.is_file() {
            bail!("rootfs source {} does not exist", path.display());
        }
        path
    };

    let extractor = Extractor::new(ctx.seven_zip());
    let tarball = extractor.extract_rootfs(&source, work_dir.path())?;

    std::fs::create_dir_all(&args.dest)
        .with_context(|| format!("failed to create {}", args.dest.display()))?;
    launcher
        .import(&args.name, &args.dest, &tarball, args.version)
        .await?;
    print_success(&format!(
        "Imported {} as WSL {} at {}",
        args.name,
        args.version,
        args.dest.display()
    ));

    if let Some(user) = &args.user {
        create_default_user(&launcher, &args.name, user).await?;
    }

    if args.set_default {
        launcher.set_default(&args.name).await?;
        print_success(&format!("{} is now the default distribution", args.name));
    }

    Ok(())
}

/// Create `user` inside the distro and record it as the default user.
async fn create_default_user(launcher: &WslLauncher, distro: &str, user: &str) -> Result<()> {
    // Not every rootfs ships useradd; fall back to BusyBox adduser.
    launcher
        .exec(
            distro,
            Some("root"),
            &format!("useradd -m -s /bin/sh {user} 2>/dev/null || adduser -D {user}"),
        )
        .await
        .with_context(|| format!("failed to create user {user} in {distro}"))?;

    let uid_output = launcher
        .exec(distro, Some("root"), &format!("id -u {user}"))
        .await?;
    let uid: u32 = uid_output
        .trim()
        .parse()
        .with_context(|| format!("unexpected id output for {user}: {uid_output:?}"))?;

    match open_default_store() {
        Ok(mut store) => {
            store.set_default_uid(distro, uid)?;
            print_success(&format!("Created {user} (uid {uid}) as default user"));
        }
        Err(err) => {
            print_warning(&format!(
                "created {user} (uid {uid}) but could not update the registration record: {err}"
            ));
        }
    }

    Ok(())
}
