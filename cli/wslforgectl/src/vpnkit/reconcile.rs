//! The configure/unconfigure half of VPNKit provisioning.
//!
//! These two procedures edit a distro's `/etc/wsl.conf` and `/etc/resolv.conf`
//! through the idempotent patcher. They operate on an "etc dir" the host can
//! see: `\\wsl$\<distro>\etc` in production, a plain temp directory in tests.
//! They are deliberately decoupled from install/uninstall so a distro can run
//! in DNS-only client mode while another distro hosts the relay process.

use std::path::{Path, PathBuf};

use wslforge_confpatch::{
    ensure_section_key, remove_file_if_exists, remove_key_everywhere, replace_file, PatchError,
};

use super::templates;

const NETWORK_SECTION: &str = "network";
const RESOLV_KEY: &str = "generateResolvConf";

/// The two configuration files configure/unconfigure touch.
#[derive(Debug, Clone)]
pub struct EtcPaths {
    pub wsl_conf: PathBuf,
    pub resolv_conf: PathBuf,
}

impl EtcPaths {
    /// Paths rooted at an arbitrary etc directory.
    pub fn new(etc_dir: &Path) -> Self {
        Self {
            wsl_conf: etc_dir.join("wsl.conf"),
            resolv_conf: etc_dir.join("resolv.conf"),
        }
    }

    /// Paths inside a running distro, via the `\\wsl$` share.
    pub fn for_distro(distro: &str) -> Self {
        Self::new(Path::new(&format!(r"\\wsl$\{distro}\etc")))
    }
}

/// Enforce the relay DNS configuration.
///
/// `wsl.conf` is patched idempotently; `resolv.conf` is replaced outright
/// (its content is static, so no idempotence check is needed).
pub fn configure(etc: &EtcPaths) -> Result<(), PatchError> {
    ensure_section_key(&etc.wsl_conf, NETWORK_SECTION, RESOLV_KEY, "false")?;
    replace_file(&etc.resolv_conf, &templates::resolv_conf())?;
    Ok(())
}

/// Revert the relay DNS configuration.
///
/// Deletes `resolv.conf` if present, strips the key from `wsl.conf`, and
/// removes `wsl.conf` entirely when only the bare `[network]` header this
/// tool wrote remains.
pub fn unconfigure(etc: &EtcPaths) -> Result<(), PatchError> {
    remove_file_if_exists(&etc.resolv_conf)?;
    remove_key_everywhere(&etc.wsl_conf, NETWORK_SECTION, RESOLV_KEY)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn configure_from_scratch_writes_canonical_files() {
        let dir = tempfile::tempdir().unwrap();
        let etc = EtcPaths::new(dir.path());

        configure(&etc).unwrap();

        assert_eq!(
            fs::read_to_string(&etc.wsl_conf).unwrap(),
            "[network]\ngenerateResolvConf = false\n"
        );
        assert_eq!(
            fs::read_to_string(&etc.resolv_conf).unwrap(),
            "nameserver 192.168.67.1\nnameserver 1.1.1.1\n"
        );
    }

    #[test]
    fn configure_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let etc = EtcPaths::new(dir.path());

        configure(&etc).unwrap();
        let wsl_conf_once = fs::read(&etc.wsl_conf).unwrap();
        let resolv_once = fs::read(&etc.resolv_conf).unwrap();

        configure(&etc).unwrap();
        assert_eq!(fs::read(&etc.wsl_conf).unwrap(), wsl_conf_once);
        assert_eq!(fs::read(&etc.resolv_conf).unwrap(), resolv_once);
    }

    #[test]
    fn unconfigure_removes_tool_owned_files() {
        let dir = tempfile::tempdir().unwrap();
        let etc = EtcPaths::new(dir.path());

        configure(&etc).unwrap();
        unconfigure(&etc).unwrap();

        assert!(!etc.wsl_conf.exists());
        assert!(!etc.resolv_conf.exists());
    }

    #[test]
    fn unconfigure_on_clean_distro_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let etc = EtcPaths::new(dir.path());

        unconfigure(&etc).unwrap();
        assert!(!etc.wsl_conf.exists());
    }

    #[test]
    fn etc_paths_for_distro_use_the_wsl_share() {
        let etc = EtcPaths::for_distro("Ubuntu");
        assert_eq!(
            etc.wsl_conf.to_string_lossy(),
            r"\\wsl$\Ubuntu\etc\wsl.conf"
        );
    }
}
