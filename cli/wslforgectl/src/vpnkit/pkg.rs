//! Package-manager family dispatch.
//!
//! The relay has exactly one in-distro dependency, a socket-relay utility.
//! Rather than a per-distro-name if/else chain, distros collapse into a
//! closed set of package-manager families, each with one install command.

/// Package-manager families this tool knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkgFamily {
    Apt,
    Apk,
    Pacman,
    Rpm,
    Xbps,
}

impl PkgFamily {
    /// Detect the family from `/etc/os-release` content, consulting `ID`
    /// first and falling back to `ID_LIKE` tokens.
    pub fn detect(os_release: &str) -> Option<Self> {
        let mut id = None;
        let mut id_like = String::new();

        for line in os_release.lines() {
            if let Some(value) = line.strip_prefix("ID=") {
                id = Some(trim_quotes(value).to_ascii_lowercase());
            } else if let Some(value) = line.strip_prefix("ID_LIKE=") {
                id_like = trim_quotes(value).to_ascii_lowercase();
            }
        }

        if let Some(family) = id.as_deref().and_then(family_for_id) {
            return Some(family);
        }

        id_like
            .split_whitespace()
            .find_map(family_for_id)
    }

    /// The shell command that installs `package` non-interactively.
    pub fn install_command(&self, package: &str) -> String {
        match self {
            Self::Apt => format!("apt-get install -y {package}"),
            Self::Apk => format!("apk add {package}"),
            Self::Pacman => format!("pacman -S --noconfirm {package}"),
            Self::Rpm => format!("dnf install -y {package}"),
            Self::Xbps => format!("xbps-install -y {package}"),
        }
    }
}

fn family_for_id(id: &str) -> Option<PkgFamily> {
    match id {
        "debian" | "ubuntu" => Some(PkgFamily::Apt),
        "alpine" => Some(PkgFamily::Apk),
        "arch" | "archarm" => Some(PkgFamily::Pacman),
        "fedora" | "rhel" | "centos" => Some(PkgFamily::Rpm),
        "void" => Some(PkgFamily::Xbps),
        _ => None,
    }
}

fn trim_quotes(value: &str) -> &str {
    value.trim().trim_matches('"').trim_matches('\'')
}
