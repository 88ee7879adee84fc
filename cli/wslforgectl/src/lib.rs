//! wslforge - a toolkit for provisioning and operating WSL distributions.
//!
//! Everything here is glue around external tools: `wsl.exe` owns the distro
//! lifecycle, the Windows registry owns distro metadata, and the VPNKit relay
//! binaries own the actual network bridging. This crate downloads, extracts,
//! patches configuration files, and launches those tools in the right order.
//!
//! ## Modules
//!
//! - `wsl`: wrapper around the WSL launcher binary
//! - `store`: access to WSL distro registrations (registry on Windows,
//!   in-memory fake elsewhere)
//! - `download` / `extract`: rootfs image acquisition
//! - `vpnkit`: relay artifact provisioning and the
//!   install/configure/unconfigure/uninstall procedures

pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod output;
pub mod store;
pub mod vpnkit;
pub mod wsl;
