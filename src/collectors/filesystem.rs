use crate::domain::{OwnerPolicy, Peak};
use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::process::Command;

/// Pseudo filesystem that never counts toward the fullest mount.
const DEVFS: &str = "devfs";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MountUsage {
    pub filesystem: String,
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    pub used_pct: f64,
    pub mount: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FilesystemStats {
    pub mounts: Vec<MountUsage>,
    pub total_kb: u64,
    pub used_kb: u64,
    pub free_kb: u64,
    /// used / (used + free) over every local mount.
    pub used_pct: f64,
    /// Fullest mount point by its own used percentage.
    pub fullest: Peak,
}

impl FilesystemStats {
    pub fn mount(&self, path: &str) -> Option<&MountUsage> {
        self.mounts.iter().find(|m| m.mount == path)
    }
}

fn parse_df_line(line: &str) -> Option<MountUsage> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [filesystem, total, used, free, capacity, mount] = fields.as_slice() else {
        return None;
    };
    Some(MountUsage {
        filesystem: filesystem.to_string(),
        total_kb: total.parse().ok()?,
        used_kb: used.parse().ok()?,
        free_kb: free.parse().ok()?,
        used_pct: capacity.trim_end_matches('%').parse().ok()?,
        mount: mount.to_string(),
    })
}

/// Parse `df -lP` output. The POSIX flag keeps long device names from
/// wrapping onto a second line.
pub fn parse_df(output: &str) -> FilesystemStats {
    let mut stats = FilesystemStats::default();

    for line in output.lines().skip(1) {
        let Some(usage) = parse_df_line(line) else {
            debug!("skipping df line: {}", line);
            continue;
        };
        stats.total_kb += usage.total_kb;
        stats.used_kb += usage.used_kb;
        stats.free_kb += usage.free_kb;
        stats.mounts.push(usage);
    }

    let capacity = stats.used_kb + stats.free_kb;
    if capacity > 0 {
        stats.used_pct = stats.used_kb as f64 / capacity as f64 * 100.0;
    }
    stats.fullest = Peak::scan(
        stats
            .mounts
            .iter()
            .filter(|m| m.filesystem != DEVFS)
            .map(|m| (m.mount.as_str(), m.used_pct)),
        OwnerPolicy::RequirePositive,
    );

    stats
}

pub struct FilesystemCollector;

impl FilesystemCollector {
    pub fn new() -> Self {
        Self
    }

    pub fn collect(&self) -> Result<FilesystemStats> {
        let output = Command::new("df")
            .arg("-lP")
            .output()
            .context("Failed to run df -lP")?;
        if !output.status.success() {
            anyhow::bail!("df -lP exited with {}", output.status);
        }
        Ok(parse_df(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for FilesystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DF: &str = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1         10000000  6000000   4000000      60% /
devfs                    1        1         0     100% /dev
tmpfs              1000000        0   1000000       0% /run
/dev/sdb1         20000000 16000000   4000000      80% /data
/dev/mapper/very-long-volume-name  500  250  250  50% /srv
";

    #[test]
    fn totals_cover_every_mount() {
        let stats = parse_df(DF);
        assert_eq!(stats.mounts.len(), 5);
        assert_eq!(stats.used_kb, 22_000_251);
        assert_eq!(stats.free_kb, 9_000_250);
        assert_eq!(stats.mount("/srv").unwrap().used_pct, 50.0);
    }

    #[test]
    fn fullest_mount_ignores_devfs() {
        let stats = parse_df(DF);
        assert_eq!(stats.fullest.value, 80.0);
        assert_eq!(stats.fullest.owner.as_deref(), Some("/data"));
    }

    #[test]
    fn empty_mounts_have_no_owner() {
        let stats = parse_df("Filesystem 1024-blocks Used Available Capacity Mounted on\ntmpfs 10 0 10 0% /run\n");
        assert_eq!(stats.fullest, Peak::default());
        assert_eq!(stats.used_pct, 0.0);
    }
}
