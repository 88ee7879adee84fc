//! Error display for the CLI.

use colored::Colorize;

use crate::download::DownloadError;
use crate::store::StoreError;
use crate::wsl::WslError;

/// Print an error in a user-friendly format, with hints where the cause is
/// recognizable.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(wsl_err) = err.downcast_ref::<WslError>() {
        match wsl_err {
            WslError::Launch { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Is WSL installed and wsl.exe on PATH? Use --wsl-exe to point at it."
                        .yellow()
                );
            }
            WslError::CommandFailed { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The WSL launcher rejected the operation; the exit code and output are \
                     shown above."
                        .yellow()
                );
            }
            _ => {}
        }
    }

    if let Some(DownloadError::Http(_)) = err.downcast_ref::<DownloadError>() {
        eprintln!(
            "\n{}",
            "Hint: Check your network connection and the download URL.".yellow()
        );
    }

    if let Some(StoreError::Unsupported) = err.downcast_ref::<StoreError>() {
        eprintln!(
            "\n{}",
            "Hint: Distro registration records live in the Windows registry; run this on the \
             Windows host."
                .yellow()
        );
    }
}
