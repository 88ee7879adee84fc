//! Generated VPNKit artifacts, rendered from fixed templates.
//!
//! Every file this tool writes into the program directory or a distro is
//! produced here from a template with named substitution points, so the
//! artifacts are testable without invoking any shell.

use thiserror::Error;

/// Relay gateway address. Must match the value compiled into the relay
/// script; the relay answers DNS on this address inside the VM.
pub const GATEWAY_ADDR: &str = "192.168.67.1";

/// Secondary fallback nameserver.
pub const FALLBACK_DNS: &str = "1.1.1.1";

/// Errors from template rendering.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unresolved placeholder {0} in template")]
    Unresolved(String),
}

/// Render `template`, substituting each `{{name}}` placeholder.
///
/// Rendering fails if any placeholder remains unresolved; the templates are
/// fixed, so this only trips when a template and its call site drift apart.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }

    if let Some(start) = out.find("{{") {
        let end = out[start..]
            .find("}}")
            .map(|offset| start + offset + 2)
            .unwrap_or(out.len());
        return Err(TemplateError::Unresolved(out[start..end].to_string()));
    }

    Ok(out)
}

/// `/etc/wsl.conf` content enforced by configure.
pub fn wsl_conf() -> String {
    "[network]\ngenerateResolvConf = false\n".to_string()
}

/// `/etc/resolv.conf` content enforced by configure: the relay gateway
/// first, then the public fallback.
pub fn resolv_conf() -> String {
    format!("nameserver {GATEWAY_ADDR}\nnameserver {FALLBACK_DNS}\n")
}

const INSTALL_TEMPLATE: &str = r#"#!/bin/sh
# Install the wsl-vpnkit relay files from the program directory given as $1.
# Must run as root: /sbin and chown root:root require it.
set -e

src="${1:-.}"

install -m 755 "$src/wsl-vpnkit" /usr/local/bin/wsl-vpnkit
install -m 755 "$src/wsl-vpnkit-install" /usr/local/bin/wsl-vpnkit-install
install -m 755 "$src/wsl-vpnkit-uninstall" /usr/local/bin/wsl-vpnkit-uninstall
install -m 755 "$src/wsl-vpnkit-configure" /usr/local/bin/wsl-vpnkit-configure
install -m 755 "$src/wsl-vpnkit-unconfigure" /usr/local/bin/wsl-vpnkit-unconfigure
install -o root -g root -m 755 "$src/vpnkit-tap-vsockd" /sbin/vpnkit-tap-vsockd
"#;

const UNINSTALL_TEMPLATE: &str = r#"#!/bin/sh
# Revert the DNS configuration, then remove every file wsl-vpnkit-install
# placed, including this script's own installed copy.
/usr/local/bin/wsl-vpnkit-unconfigure || true

rm -f /sbin/vpnkit-tap-vsockd
rm -f /usr/local/bin/wsl-vpnkit
rm -f /usr/local/bin/wsl-vpnkit-install
rm -f /usr/local/bin/wsl-vpnkit-configure
rm -f /usr/local/bin/wsl-vpnkit-unconfigure
rm -f /usr/local/bin/wsl-vpnkit-uninstall
"#;

const CONFIGURE_TEMPLATE: &str = r#"#!/bin/sh
# Pin resolv.conf to the relay gateway and stop WSL from regenerating it.
set -e

conf=/etc/wsl.conf

if [ -f "$conf" ]; then
    sed -i '/^[[:space:]]*generateResolvConf[[:space:]]*=/d' "$conf"
    if grep -q '^\[network\]$' "$conf"; then
        sed -i '/^\[network\]$/a generateResolvConf = false' "$conf"
    else
        printf '[network]\ngenerateResolvConf = false\n' >> "$conf"
    fi
else
    printf '[network]\ngenerateResolvConf = false\n' > "$conf"
fi

rm -f /etc/resolv.conf
printf 'nameserver {{gateway}}\nnameserver {{fallback_dns}}\n' > /etc/resolv.conf
"#;

const UNCONFIGURE_TEMPLATE: &str = r#"#!/bin/sh
# Revert the DNS configuration written by wsl-vpnkit-configure.
rm -f /etc/resolv.conf

conf=/etc/wsl.conf
if [ -f "$conf" ]; then
    sed -i '/^[[:space:]]*generateResolvConf[[:space:]]*=/d' "$conf"
    if [ "$(cat "$conf")" = '[network]' ]; then
        rm -f "$conf"
    fi
fi
"#;

pub fn install_script() -> Result<String, TemplateError> {
    render(INSTALL_TEMPLATE, &[])
}

pub fn uninstall_script() -> Result<String, TemplateError> {
    render(UNINSTALL_TEMPLATE, &[])
}

pub fn configure_script() -> Result<String, TemplateError> {
    render(
        CONFIGURE_TEMPLATE,
        &[("gateway", GATEWAY_ADDR), ("fallback_dns", FALLBACK_DNS)],
    )
}

pub fn unconfigure_script() -> Result<String, TemplateError> {
    render(UNCONFIGURE_TEMPLATE, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_named_placeholders() {
        let out = render("ns {{a}} / {{b}}", &[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(out, "ns 1 / 2");
    }

    #[test]
    fn render_rejects_leftover_placeholders() {
        let err = render("nameserver {{gateway}}", &[]).unwrap_err();
        assert!(matches!(err, TemplateError::Unresolved(p) if p == "{{gateway}}"));
    }

    #[test]
    fn resolv_conf_pins_gateway_then_fallback() {
        assert_eq!(
            resolv_conf(),
            "nameserver 192.168.67.1\nnameserver 1.1.1.1\n"
        );
    }

    #[test]
    fn wsl_conf_disables_resolv_generation() {
        assert_eq!(wsl_conf(), "[network]\ngenerateResolvConf = false\n");
    }

    #[test]
    fn configure_script_embeds_network_parameters() {
        let script = configure_script().unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("nameserver 192.168.67.1"));
        assert!(script.contains("nameserver 1.1.1.1"));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn install_script_places_tap_helper_in_sbin_as_root() {
        let script = install_script().unwrap();
        assert!(script.contains("install -o root -g root -m 755 \"$src/vpnkit-tap-vsockd\" /sbin/vpnkit-tap-vsockd"));
    }

    #[test]
    fn uninstall_script_removes_its_own_installed_copy() {
        let script = uninstall_script().unwrap();
        assert!(script.contains("rm -f /usr/local/bin/wsl-vpnkit-uninstall"));
    }
}
