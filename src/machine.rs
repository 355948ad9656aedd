//! Machine metadata collaborators.
//!
//! The `/machine` endpoint describes the host serving the journal. The
//! environment probes behind it (machine id, boot id, hostname, OS name,
//! virtualization) are injectable through [`MachineProbe`] so tests can
//! substitute fixed values; [`HostProbe`] is the default implementation
//! reading the conventional Linux surfaces.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

/// Sources of host identity and environment facts.
pub trait MachineProbe: Send + Sync {
    /// 128-bit identifier of the installed system image, 32 lowercase hex digits.
    fn machine_id(&self) -> Result<String>;

    /// 128-bit identifier of the current kernel boot, 32 lowercase hex digits.
    fn boot_id(&self) -> Result<String>;

    /// The raw hostname; callers clean it with [`hostname_cleanup`].
    fn hostname(&self) -> Result<String>;

    /// `PRETTY_NAME` from the OS release file, when available.
    fn os_pretty_name(&self) -> Option<String>;

    /// Short virtualization technology name, `"bare"` on physical hosts.
    fn virtualization(&self) -> String;
}

/// Probe reading the host's own identity files.
pub struct HostProbe;

impl HostProbe {
    fn read_id_file(path: &str) -> Result<String> {
        let raw = fs::read_to_string(path)
            .map_err(|err| Error::Probe(format!("{path}: {err}")))?;
        let id: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if id.len() != 32 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Probe(format!("{path}: malformed 128-bit id")));
        }
        Ok(id)
    }
}

impl MachineProbe for HostProbe {
    fn machine_id(&self) -> Result<String> {
        Self::read_id_file("/etc/machine-id")
    }

    fn boot_id(&self) -> Result<String> {
        Self::read_id_file("/proc/sys/kernel/random/boot_id")
    }

    fn hostname(&self) -> Result<String> {
        let raw = fs::read_to_string("/proc/sys/kernel/hostname")
            .map_err(|err| Error::Probe(format!("hostname: {err}")))?;
        Ok(raw.trim().to_string())
    }

    fn os_pretty_name(&self) -> Option<String> {
        let contents = fs::read_to_string("/etc/os-release").ok()?;
        parse_os_release_pretty_name(&contents)
    }

    fn virtualization(&self) -> String {
        if let Ok(hypervisor) = fs::read_to_string("/sys/hypervisor/type") {
            let hypervisor = hypervisor.trim();
            if !hypervisor.is_empty() {
                return hypervisor.to_ascii_lowercase();
            }
        }
        if Path::new("/proc/xen").exists() {
            return "xen".into();
        }
        if let Ok(vendor) = fs::read_to_string("/sys/class/dmi/id/sys_vendor") {
            let vendor = vendor.trim();
            for (needle, name) in [
                ("QEMU", "qemu"),
                ("KVM", "kvm"),
                ("VMware", "vmware"),
                ("VirtualBox", "oracle"),
                ("Microsoft", "microsoft"),
            ] {
                if vendor.contains(needle) {
                    return name.into();
                }
            }
        }
        "bare".into()
    }
}

/// Extracts `PRETTY_NAME` from os-release file contents.
///
/// Values may be bare or wrapped in single or double quotes.
pub fn parse_os_release_pretty_name(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(value) = line.strip_prefix("PRETTY_NAME=") else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Normalizes a hostname for presentation: whitespace stripped, trailing
/// dot dropped, characters outside the hostname alphabet removed.
pub fn hostname_cleanup(hostname: &str) -> String {
    let cleaned: String = hostname
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if cleaned.is_empty() {
        "localhost".into()
    } else {
        cleaned
    }
}

/// The `/machine` response document.
///
/// Numeric values are serialized as JSON strings of decimal digits; clients
/// rely on that bit-exact contract.
#[derive(Debug, Clone, Serialize)]
pub struct MachineDescriptor {
    pub machine_id: String,
    pub boot_id: String,
    pub hostname: String,
    pub os_pretty_name: String,
    pub virtualization: String,
    pub usage: String,
    pub cutoff_from_realtime: String,
    pub cutoff_to_realtime: String,
}
