//! Locates and validates the SMBIOS 3.x entry point.
//!
//! Only the 64-bit (`_SM3_`) entry point is supported. Older `_SM_` and
//! `_SM2_` descriptors are rejected rather than parsed in a degraded mode.

use bytes::Buf;
use std::borrow::Cow;
use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// Anchor string of an SMBIOS 3.x entry point.
pub const ANCHOR: &[u8; 5] = b"_SM3_";

/// Size in bytes of an SMBIOS 3.x entry point.
pub const ENTRY_POINT_SIZE: usize = 24;

/// Privileged physical memory device.
pub const DEV_MEM: &str = "/dev/mem";

#[cfg(target_os = "linux")]
pub(crate) const LINUX_EFI_SYSTAB: &str = "/sys/firmware/efi/systab";
#[cfg(target_os = "linux")]
pub(crate) const LINUX_EFI_SYSTAB_KEY: &str = "SMBIOS3=";
#[cfg(target_os = "freebsd")]
pub(crate) const FREEBSD_KENV_HINT: &str = "hint.smbios.0.mem";

/// Contains the information found in a 64-bit SMBIOS entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub checksum: u8,
    pub length: u8,
    pub major: u8,
    pub minor: u8,
    pub docrev: u8,
    pub entry_point_revision: u8,
    pub reserved: u8,
    pub structure_table_max_size: u32,
    pub structure_table_address: u64,
    checksum_valid: bool,
}

impl EntryPoint {
    /// Parses and validates an entry point from exactly
    /// [`ENTRY_POINT_SIZE`] bytes. Trailing bytes are ignored.
    pub fn parse(buf: &[u8]) -> Result<EntryPoint> {
        if buf.len() < ENTRY_POINT_SIZE {
            return Err(Error::ShortRead {
                expected: ENTRY_POINT_SIZE,
                actual: buf.len(),
            });
        }
        let buf = &buf[..ENTRY_POINT_SIZE];

        if &buf[..ANCHOR.len()] != ANCHOR {
            return Err(Error::InvalidEntryPoint("anchor is not _SM3_"));
        }

        let mut cursor = &buf[ANCHOR.len()..];
        let entry_point = EntryPoint {
            checksum: cursor.get_u8(),
            length: cursor.get_u8(),
            major: cursor.get_u8(),
            minor: cursor.get_u8(),
            docrev: cursor.get_u8(),
            entry_point_revision: cursor.get_u8(),
            reserved: cursor.get_u8(),
            structure_table_max_size: cursor.get_u32_le(),
            structure_table_address: cursor.get_u64_le(),
            checksum_valid: buf.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) == 0,
        };

        if entry_point.length as usize != ENTRY_POINT_SIZE {
            return Err(Error::InvalidEntryPoint("declared length does not match"));
        }

        if !entry_point.checksum_valid {
            tracing::warn!(
                checksum = entry_point.checksum,
                "SMBIOS entry point checksum mismatch, continuing anyway"
            );
        }

        Ok(entry_point)
    }

    /// Provides the physical address of the SMBIOS table and its maximum
    /// size in bytes.
    pub fn table(&self) -> (u64, usize) {
        (
            self.structure_table_address,
            self.structure_table_max_size as usize,
        )
    }

    /// Provides the major, minor, and docrev numbers for SMBIOS on this
    /// system.
    pub fn version(&self) -> (u8, u8, u8) {
        (self.major, self.minor, self.docrev)
    }

    /// Reports whether all entry point bytes sum to zero.
    pub fn checksum_valid(&self) -> bool {
        self.checksum_valid
    }
}

/// Reads an entry point from `mem` at physical `address`.
///
/// A read that returns fewer than [`ENTRY_POINT_SIZE`] bytes is a
/// [`Error::ShortRead`].
pub fn read_entry_point<R: Read + Seek>(mut mem: R, address: u64) -> Result<EntryPoint> {
    mem.seek(SeekFrom::Start(address))
        .map_err(|err| Error::io(DEV_MEM, err))?;

    let mut buf = Vec::with_capacity(ENTRY_POINT_SIZE);
    mem.take(ENTRY_POINT_SIZE as u64)
        .read_to_end(&mut buf)
        .map_err(|err| Error::io(DEV_MEM, err))?;

    if buf.len() != ENTRY_POINT_SIZE {
        return Err(Error::ShortRead {
            expected: ENTRY_POINT_SIZE,
            actual: buf.len(),
        });
    }

    EntryPoint::parse(&buf)
}

/// Where the operating system publishes the entry point's physical address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pointer {
    /// A `KEY=value` line in an EFI system table properties file.
    EfiSystab {
        path: Cow<'static, str>,
        key: Cow<'static, str>,
    },

    /// A kernel environment variable.
    Kenv { name: Cow<'static, str> },
}

impl Pointer {
    /// Resolves the physical address of the entry point. An absent, empty,
    /// or zero address is [`Error::EntryPointNotFound`].
    pub fn address(&self) -> Result<u64> {
        let text = match self {
            Pointer::EfiSystab { path, key } => read_prop(&**path, key)?,
            Pointer::Kenv { name } => kenv(name),
        };

        text.as_deref()
            .and_then(parse_address)
            .ok_or(Error::EntryPointNotFound)
    }
}

/// Parses an address the way C's `strtol(text, NULL, 0)` does: `0x` for
/// hexadecimal, a leading `0` for octal, decimal otherwise. Parsing stops at
/// the first character that is not a digit in the detected radix. Zero is
/// reported as `None`.
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim_start();
    let (digits, radix) = if let Some(rest) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (rest, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    match u64::from_str_radix(&digits[..end], radix) {
        Ok(0) | Err(_) => None,
        Ok(address) => Some(address),
    }
}

/// Returns the remainder of the first line in `path` that begins with `key`.
/// A missing file yields `Ok(None)`.
pub fn read_prop(path: impl AsRef<Path>, key: &str) -> Result<Option<String>> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::io(path, err)),
    };

    Ok(contents
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .map(|value| value.trim().to_string()))
}

#[cfg(target_os = "freebsd")]
fn kenv(name: &str) -> Option<String> {
    use std::ffi::{CStr, CString};

    let name = CString::new(name).ok()?;
    // KENV_MVALLEN + 1
    let mut value = [0u8; 129];
    // SAFETY: name is NUL-terminated and value is writable for its full length.
    let len = unsafe {
        libc::kenv(
            libc::KENV_GET,
            name.as_ptr(),
            value.as_mut_ptr().cast(),
            value.len() as libc::c_int,
        )
    };
    if len <= 0 {
        return None;
    }

    CStr::from_bytes_until_nul(&value)
        .ok()?
        .to_str()
        .ok()
        .map(str::to_owned)
}

#[cfg(not(target_os = "freebsd"))]
fn kenv(_name: &str) -> Option<String> {
    None
}
