//! Reads individual DMI attributes the kernel exports as text files.

use std::fs;
use std::path::Path;

use crate::sanitize::is_significant;

/// Reads a DMI attribute from `devices_path`, falling back to `class_path`.
///
/// Trailing whitespace is trimmed. A file that is missing, unreadable, or
/// holds a placeholder value is skipped.
///
/// ```no_run
/// let vendor = smbios_table::dmi::read_value(
///     "/sys/devices/virtual/dmi/id/sys_vendor",
///     "/sys/class/dmi/id/sys_vendor",
/// );
/// ```
pub fn read_value(devices_path: impl AsRef<Path>, class_path: impl AsRef<Path>) -> Option<String> {
    [devices_path.as_ref(), class_path.as_ref()]
        .into_iter()
        .find_map(read_significant)
}

fn read_significant(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim_end();
    is_significant(value).then(|| value.to_string())
}
