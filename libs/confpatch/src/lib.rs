//! Idempotent patching of INI-style configuration files.
//!
//! WSL's `/etc/wsl.conf` follows an INI-like convention: `[section]`
//! headers, `key = value` lines, `#` comments. This library applies a
//! desired key/value exactly once regardless of how often the operation
//! runs, without touching unrelated content.
//!
//! # Invariants
//!
//! - `ensure_section_key` applied twice with identical arguments leaves the
//!   file byte-identical to applying it once.
//! - After `ensure_section_key` the file holds exactly one line for the key,
//!   directly below the section header.
//! - `remove_key_everywhere` on a file without the key does not rewrite the
//!   file at all (byte-for-byte no-op).
//!
//! Key-line matching is deliberately blunt: every `key = <anything>` line is
//! removed file-wide, regardless of which section it currently sits in. CRLF
//! input is normalized to LF on the first rewrite.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors from patch operations.
///
/// Any filesystem failure is fatal for the operation; a failed patch leaves
/// the file in whatever state the last successful write left it.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of stripping a key from file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripOutcome {
    /// No line matched the key; the file must not be rewritten.
    Unchanged,
    /// Matching lines were removed; the file should hold this content.
    Rewritten(String),
    /// Only the bare section header remains; the file should be deleted.
    DeleteFile,
}

/// Returns true if `line` assigns `key`, i.e. it reads `key = <anything>`
/// modulo surrounding whitespace.
pub fn is_key_line(line: &str, key: &str) -> bool {
    line.trim_start()
        .strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

fn is_section_header(line: &str, section: &str) -> bool {
    let header = format!("[{section}]");
    line.trim() == header
}

/// Pure content transform behind [`ensure_section_key`].
///
/// Removes every `key = <anything>` line file-wide, then inserts
/// `key = value` directly below the first `[section]` header. When no header
/// exists a `[section]` block is appended at end of file.
pub fn apply_section_key(content: &str, section: &str, key: &str, value: &str) -> String {
    let header = format!("[{section}]");
    let entry = format!("{key} = {value}");

    let mut lines: Vec<&str> = content
        .lines()
        .filter(|line| !is_key_line(line, key))
        .collect();

    match lines.iter().position(|line| is_section_header(line, section)) {
        Some(idx) => lines.insert(idx + 1, &entry),
        None => {
            lines.push(&header);
            lines.push(&entry);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Pure content transform behind [`remove_key_everywhere`].
pub fn strip_key(content: &str, section: &str, key: &str) -> StripOutcome {
    let total = content.lines().count();
    let kept: Vec<&str> = content
        .lines()
        .filter(|line| !is_key_line(line, key))
        .collect();

    if kept.len() == total {
        return StripOutcome::Unchanged;
    }

    let out = if kept.is_empty() {
        String::new()
    } else {
        let mut joined = kept.join("\n");
        joined.push('\n');
        joined
    };

    // Literal comparison against the exact bare-header file this tool itself
    // writes. A manually reformatted header is left alone on purpose.
    if out == format!("[{section}]\n") {
        StripOutcome::DeleteFile
    } else {
        StripOutcome::Rewritten(out)
    }
}

/// Enforce `key = value` under `[section]` in `file`.
///
/// Creates the file (containing exactly the header and the entry) when it
/// does not exist. Idempotent: a second identical call leaves the file
/// byte-identical.
pub fn ensure_section_key(
    file: &Path,
    section: &str,
    key: &str,
    value: &str,
) -> Result<(), PatchError> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };

    fs::write(file, apply_section_key(&content, section, key, value))?;
    Ok(())
}

/// Delete every `key = <anything>` line in `file`, regardless of section.
///
/// When the remaining content is byte-identical to the bare `[section]`
/// header the file is deleted outright. A missing file or a file without the
/// key is a no-op, not an error.
pub fn remove_key_everywhere(file: &Path, section: &str, key: &str) -> Result<(), PatchError> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    match strip_key(&content, section, key) {
        StripOutcome::Unchanged => Ok(()),
        StripOutcome::Rewritten(out) => {
            fs::write(file, out)?;
            Ok(())
        }
        StripOutcome::DeleteFile => {
            fs::remove_file(file)?;
            Ok(())
        }
    }
}

/// Replace `file` with `content` verbatim, never merging with what was there.
pub fn replace_file(file: &Path, content: &str) -> Result<(), PatchError> {
    match fs::remove_file(file) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    fs::write(file, content)?;
    Ok(())
}

/// Delete `file` if present. Returns whether a file was removed.
pub fn remove_file_if_exists(file: &Path) -> Result<bool, PatchError> {
    match fs::remove_file(file) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_content_from_nothing() {
        let out = apply_section_key("", "network", "generateResolvConf", "false");
        assert_eq!(out, "[network]\ngenerateResolvConf = false\n");
    }

    #[test]
    fn inserts_below_existing_header() {
        let before = "[automount]\nenabled = true\n\n[network]\nhostname = dev\n";
        let out = apply_section_key(before, "network", "generateResolvConf", "false");
        assert_eq!(
            out,
            "[automount]\nenabled = true\n\n[network]\ngenerateResolvConf = false\nhostname = dev\n"
        );
    }

    #[test]
    fn removes_stale_key_lines_file_wide() {
        let before = "[automount]\ngenerateResolvConf = true\n[network]\n";
        let out = apply_section_key(before, "network", "generateResolvConf", "false");
        assert_eq!(
            out,
            "[automount]\n[network]\ngenerateResolvConf = false\n"
        );
    }

    #[test]
    fn appends_section_when_header_missing() {
        let before = "[automount]\nenabled = true\n";
        let out = apply_section_key(before, "network", "generateResolvConf", "false");
        assert_eq!(
            out,
            "[automount]\nenabled = true\n[network]\ngenerateResolvConf = false\n"
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let once = apply_section_key(
            "[network]\nhostname = dev\n",
            "network",
            "generateResolvConf",
            "false",
        );
        let twice = apply_section_key(&once, "network", "generateResolvConf", "false");
        assert_eq!(once, twice);
    }

    #[test]
    fn key_matching_requires_assignment() {
        assert!(is_key_line("generateResolvConf = false", "generateResolvConf"));
        assert!(is_key_line("  generateResolvConf=true", "generateResolvConf"));
        assert!(!is_key_line("generateResolvConfExtra = 1", "generateResolvConf"));
        assert!(!is_key_line("# generateResolvConf = false", "generateResolvConf"));
        assert!(!is_key_line("generateResolvConf", "generateResolvConf"));
    }

    #[test]
    fn strip_without_match_is_unchanged() {
        let content = "[network]\nhostname = dev";
        assert_eq!(
            strip_key(content, "network", "generateResolvConf"),
            StripOutcome::Unchanged
        );
    }

    #[test]
    fn strip_leaving_bare_header_deletes() {
        let content = "[network]\ngenerateResolvConf = false\n";
        assert_eq!(
            strip_key(content, "network", "generateResolvConf"),
            StripOutcome::DeleteFile
        );
    }

    #[test]
    fn strip_keeps_unrelated_sections() {
        let content = "[automount]\nenabled = true\n[network]\ngenerateResolvConf = false\n";
        assert_eq!(
            strip_key(content, "network", "generateResolvConf"),
            StripOutcome::Rewritten("[automount]\nenabled = true\n[network]\n".to_string())
        );
    }

    #[test]
    fn reformatted_bare_header_is_left_alone() {
        // Different whitespace style than this tool generates: rewritten, not
        // deleted.
        let content = "[network] \ngenerateResolvConf = false\n";
        assert_eq!(
            strip_key(content, "network", "generateResolvConf"),
            StripOutcome::Rewritten("[network] \n".to_string())
        );
    }

    #[test]
    fn file_ops_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("wsl.conf");

        ensure_section_key(&conf, "network", "generateResolvConf", "false").unwrap();
        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "[network]\ngenerateResolvConf = false\n"
        );

        ensure_section_key(&conf, "network", "generateResolvConf", "false").unwrap();
        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "[network]\ngenerateResolvConf = false\n"
        );

        remove_key_everywhere(&conf, "network", "generateResolvConf").unwrap();
        assert!(!conf.exists());

        // No-ops on the now-missing file.
        remove_key_everywhere(&conf, "network", "generateResolvConf").unwrap();
        assert!(!remove_file_if_exists(&conf).unwrap());
    }

    #[test]
    fn replace_file_is_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolv.conf");

        replace_file(&resolv, "nameserver 192.168.67.1\n").unwrap();
        replace_file(&resolv, "nameserver 1.1.1.1\n").unwrap();
        assert_eq!(fs::read_to_string(&resolv).unwrap(), "nameserver 1.1.1.1\n");
    }
}
