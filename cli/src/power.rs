use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const SYSFS_POWER_SUPPLY: &str = "/sys/class/power_supply";

/// Whether the machine currently runs on external power.
pub trait PowerSource: Send + Sync {
    fn on_external_power(&self) -> io::Result<bool>;
}

/// Reads the Linux power-supply class.
///
/// An online mains or USB supply means external power. Without one, a
/// discharging battery means battery power. Machines with no power-supply
/// entries at all (desktops, containers, other platforms) count as external
/// power.
pub struct SysfsPowerSource {
    root: PathBuf,
}

impl SysfsPowerSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Default for SysfsPowerSource {
    fn default() -> Self {
        Self::new(SYSFS_POWER_SUPPLY)
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

impl PowerSource for SysfsPowerSource {
    fn on_external_power(&self) -> io::Result<bool> {
        if !self.root.is_dir() {
            return Ok(true);
        }

        let mut external_supplies = 0;
        let mut batteries = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let dir = entry?.path();
            match read_attr(&dir, "type").as_deref() {
                Some("Battery") => batteries.push(dir),
                Some("Mains") | Some("USB") | Some("USB_C") | Some("USB_PD") => {
                    external_supplies += 1;
                    if read_attr(&dir, "online").as_deref() == Some("1") {
                        return Ok(true);
                    }
                }
                _ => {}
            }
        }

        if batteries.is_empty() {
            return Ok(true);
        }
        if external_supplies > 0 {
            return Ok(false);
        }

        let discharging = batteries
            .iter()
            .any(|dir| read_attr(dir, "status").as_deref() == Some("Discharging"));
        Ok(!discharging)
    }
}

/// Fixed answer, for tests.
#[cfg(test)]
pub struct AssumePower(pub bool);

#[cfg(test)]
impl PowerSource for AssumePower {
    fn on_external_power(&self) -> io::Result<bool> {
        Ok(self.0)
    }
}
