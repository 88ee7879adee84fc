//! Starting the relay process.
//!
//! At most one relay may be active system-wide: every WSL2 distro shares one
//! VM, and two relays would fight over its virtual interface. Before
//! starting, a pre-existing relay process is detected by image name and the
//! user is offered a kill - a check-then-prompt-then-kill sequence, not a
//! lock. There is no timeout or cancellation handling anywhere; an attached
//! relay runs until it exits, a detached one until the user stops it.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::wsl::DEFAULT_WSL_EXE;

/// Image name of the host-side relay process.
pub const RELAY_IMAGE_NAME: &str = "wsl-vpnkit.exe";

/// Installed path of the relay script inside the distro.
const RELAY_SCRIPT_PATH: &str = "/usr/local/bin/wsl-vpnkit";

/// Starts the relay attached or detached.
pub struct RelayRunner {
    wsl_exe: PathBuf,
}

impl RelayRunner {
    pub fn new(wsl_exe: Option<PathBuf>) -> Self {
        Self {
            wsl_exe: wsl_exe.unwrap_or_else(|| PathBuf::from(DEFAULT_WSL_EXE)),
        }
    }

    /// Start the relay in `distro`.
    ///
    /// Attached mode blocks until the relay exits and propagates its exit
    /// code. Detached mode spawns a new console window and does not track
    /// the process afterwards.
    pub async fn start(&self, distro: &str, detach: bool, assume_yes: bool) -> Result<()> {
        let pids = find_relay_processes(RELAY_IMAGE_NAME).await;
        if !pids.is_empty() {
            let listing = pids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let kill = assume_yes
                || prompt_yes(&format!(
                    "{RELAY_IMAGE_NAME} is already running (pid {listing}). Kill it and continue?"
                ))?;
            if !kill {
                bail!(
                    "a relay process is already running (pid {listing}); at most one relay may \
                     be active across all distros"
                );
            }
            for pid in pids {
                kill_process(pid).await?;
            }
        }

        if detach {
            self.spawn_detached(distro)?;
            info!(distro = %distro, "Relay started detached");
            Ok(())
        } else {
            info!(distro = %distro, "Starting relay attached to this console");
            let status = Command::new(&self.wsl_exe)
                .args(["-d", distro, "--user", "root", RELAY_SCRIPT_PATH])
                .status()
                .await
                .context("failed to launch the WSL launcher for the relay")?;

            if !status.success() {
                bail!(
                    "relay exited with code {}",
                    status.code().unwrap_or(-1)
                );
            }
            Ok(())
        }
    }

    /// Fire-and-forget into a new console window via `cmd /C start`.
    ///
    /// The whole `start` invocation is passed as one raw argument: `start`
    /// only treats its first token as a window title when it is quoted, and
    /// the standard argument quoting never quotes a token without spaces.
    #[cfg(windows)]
    fn spawn_detached(&self, distro: &str) -> Result<()> {
        use std::os::windows::process::CommandExt;

        std::process::Command::new("cmd")
            .raw_arg(format!(
                "/C {}",
                start_command_line(&self.wsl_exe, distro)
            ))
            .spawn()
            .context("failed to spawn detached relay window")?;
        Ok(())
    }

    #[cfg(not(windows))]
    fn spawn_detached(&self, _distro: &str) -> Result<()> {
        bail!("detached relay start requires a Windows console host");
    }
}

/// The `start` command line for a detached relay: quoted window title first,
/// then the quoted launcher path and its arguments.
#[cfg_attr(not(windows), allow(dead_code))]
fn start_command_line(wsl_exe: &std::path::Path, distro: &str) -> String {
    format!(
        "start \"wsl-vpnkit\" \"{}\" -d {} --user root {}",
        wsl_exe.display(),
        distro,
        RELAY_SCRIPT_PATH
    )
}

/// Find PIDs of running processes matching `image`.
///
/// Detection is a convenience: when the task query tool is unavailable the
/// start proceeds without it.
async fn find_relay_processes(image: &str) -> Vec<u32> {
    let filter = format!("IMAGENAME eq {image}");
    let output = Command::new("tasklist")
        .args(["/FI", &filter, "/FO", "CSV", "/NH"])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            parse_tasklist_csv(&String::from_utf8_lossy(&out.stdout))
        }
        _ => {
            warn!("could not query running tasks; skipping relay detection");
            Vec::new()
        }
    }
}

async fn kill_process(pid: u32) -> Result<()> {
    let pid_arg = pid.to_string();
    let output = Command::new("taskkill")
        .args(["/PID", &pid_arg, "/F"])
        .output()
        .await
        .context("failed to launch taskkill")?;

    if !output.status.success() {
        bail!(
            "taskkill /PID {pid} failed with code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    info!(pid, "Killed pre-existing relay process");
    Ok(())
}

/// Parse `tasklist /FO CSV /NH` output into PIDs.
///
/// Rows look like `"wsl-vpnkit.exe","1234","Console","1","10,572 K"`. The
/// informational "no tasks" message is unquoted and yields no rows.
pub fn parse_tasklist_csv(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim().strip_prefix('"')?.strip_suffix('"')?;
            let mut fields = line.split("\",\"");
            let _image = fields.next()?;
            fields.next()?.parse::<u32>().ok()
        })
        .collect()
}

fn prompt_yes(message: &str) -> io::Result<bool> {
    eprint!("{message} [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}
