//! Platform acquisition of the raw SMBIOS structure table.
//!
//! Each platform tries a fixed list of [`Strategy`] values in order and the
//! first one to produce a non-empty table wins.

use bytes::{Buf, Bytes};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::ops::Deref;
use std::path::Path;

#[cfg(unix)]
use crate::entry_point::read_entry_point;
use crate::entry_point::Pointer;
use crate::error::{Error, Result};

// Predetermined locations where SMBIOS information can be found.
#[cfg(target_os = "linux")]
const LINUX_SYSFS_DMI: &str = "/sys/firmware/dmi/tables/DMI";

/// Size of the `RawSMBIOSData` envelope returned by the Windows firmware
/// table API ahead of the structure table.
pub const RAW_SMBIOS_HEADER_SIZE: usize = 8;

/// The strategies tried on this platform, in priority order.
#[cfg(target_os = "linux")]
pub const PLATFORM_STRATEGIES: &[Strategy] = &[
    Strategy::DmiFile {
        path: Cow::Borrowed(LINUX_SYSFS_DMI),
    },
    Strategy::PhysicalMemory {
        pointer: Pointer::EfiSystab {
            path: Cow::Borrowed(crate::entry_point::LINUX_EFI_SYSTAB),
            key: Cow::Borrowed(crate::entry_point::LINUX_EFI_SYSTAB_KEY),
        },
        mem: Cow::Borrowed(crate::entry_point::DEV_MEM),
    },
];

/// The strategies tried on this platform, in priority order.
#[cfg(target_os = "freebsd")]
pub const PLATFORM_STRATEGIES: &[Strategy] = &[Strategy::PhysicalMemory {
    pointer: Pointer::Kenv {
        name: Cow::Borrowed(crate::entry_point::FREEBSD_KENV_HINT),
    },
    mem: Cow::Borrowed(crate::entry_point::DEV_MEM),
}];

/// The strategies tried on this platform, in priority order.
#[cfg(windows)]
pub const PLATFORM_STRATEGIES: &[Strategy] = &[Strategy::FirmwareTable];

/// The strategies tried on this platform, in priority order.
#[cfg(not(any(target_os = "linux", target_os = "freebsd", windows)))]
pub const PLATFORM_STRATEGIES: &[Strategy] = &[];

/// A read-only buffer holding the concatenated SMBIOS structures.
pub struct RawTable {
    storage: Storage,
}

enum Storage {
    Owned(Bytes),
    #[cfg(unix)]
    Mapped(memmap2::Mmap),
}

impl RawTable {
    /// The table bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(bytes) => &bytes[..],
            #[cfg(unix)]
            Storage::Mapped(mmap) => &mmap[..],
        }
    }

    /// Reports whether the table was mapped from physical memory rather
    /// than copied into the process.
    pub fn is_mapped(&self) -> bool {
        match self.storage {
            Storage::Owned(_) => false,
            #[cfg(unix)]
            Storage::Mapped(_) => true,
        }
    }
}

impl Deref for RawTable {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Bytes> for RawTable {
    fn from(bytes: Bytes) -> Self {
        RawTable {
            storage: Storage::Owned(bytes),
        }
    }
}

impl From<Vec<u8>> for RawTable {
    fn from(bytes: Vec<u8>) -> Self {
        RawTable::from(Bytes::from(bytes))
    }
}

impl fmt::Debug for RawTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RawTable")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Produces a raw SMBIOS table.
pub trait Source {
    fn acquire(&self) -> Result<RawTable>;
}

impl<F> Source for F
where
    F: Fn() -> Result<RawTable>,
{
    fn acquire(&self) -> Result<RawTable> {
        self()
    }
}

/// One way of acquiring the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// A pre-assembled DMI table exported by the kernel as a file.
    DmiFile { path: Cow<'static, str> },

    /// The platform firmware table API (`GetSystemFirmwareTable`).
    FirmwareTable,

    /// An entry point located through `pointer`, then the table it
    /// describes mapped read-only from the `mem` device.
    PhysicalMemory {
        pointer: Pointer,
        mem: Cow<'static, str>,
    },
}

impl Source for Strategy {
    fn acquire(&self) -> Result<RawTable> {
        match self {
            Strategy::DmiFile { path } => read_dmi_file(&**path),
            Strategy::FirmwareTable => firmware_table(),
            Strategy::PhysicalMemory { pointer, mem } => map_physical(pointer, mem),
        }
    }
}

/// Tries this platform's [`PLATFORM_STRATEGIES`] in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformSource;

impl Source for PlatformSource {
    fn acquire(&self) -> Result<RawTable> {
        acquire_first(PLATFORM_STRATEGIES)
    }
}

/// Returns the table from the first strategy that succeeds, or the last
/// error if none do. An empty list is [`Error::SourceUnavailable`].
pub fn acquire_first<S: Source + fmt::Debug>(strategies: &[S]) -> Result<RawTable> {
    let mut last = Error::SourceUnavailable;
    for strategy in strategies {
        match strategy.acquire() {
            Ok(table) => {
                tracing::debug!(?strategy, len = table.len(), "acquired SMBIOS table");
                return Ok(table);
            }
            Err(err) => {
                tracing::debug!(?strategy, %err, "SMBIOS strategy failed");
                last = err;
            }
        }
    }

    Err(last)
}

/// Reads a whole DMI table file into memory.
pub fn read_dmi_file(path: impl AsRef<Path>) -> Result<RawTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| Error::io(path, err))?;
    if bytes.is_empty() {
        return Err(Error::EmptyTable);
    }

    Ok(RawTable::from(bytes))
}

/// Strips the `RawSMBIOSData` envelope from a firmware table API result.
///
/// The declared table length is clamped to the bytes actually returned.
pub fn parse_raw_smbios_data(mut buf: Bytes) -> Result<RawTable> {
    if buf.len() < RAW_SMBIOS_HEADER_SIZE {
        return Err(Error::ShortRead {
            expected: RAW_SMBIOS_HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let _calling_method = buf.get_u8();
    let major = buf.get_u8();
    let minor = buf.get_u8();
    let dmi_revision = buf.get_u8();
    let length = buf.get_u32_le() as usize;
    tracing::debug!(major, minor, dmi_revision, length, "firmware table envelope");

    let length = length.min(buf.len());
    if length == 0 {
        return Err(Error::EmptyTable);
    }

    Ok(RawTable::from(buf.slice(..length)))
}

#[cfg(windows)]
fn firmware_table() -> Result<RawTable> {
    use windows::Win32::System::SystemInformation::{GetSystemFirmwareTable, RSMB};

    // SAFETY: a `None` buffer only queries the required size.
    let size = unsafe { GetSystemFirmwareTable(RSMB, 0, None) } as usize;
    if size <= RAW_SMBIOS_HEADER_SIZE {
        return Err(Error::ShortRead {
            expected: RAW_SMBIOS_HEADER_SIZE + 1,
            actual: size,
        });
    }

    let mut buffer = vec![0; size];
    // SAFETY: buffer is exactly `size` writable bytes.
    let got = unsafe { GetSystemFirmwareTable(RSMB, 0, Some(&mut buffer[..])) } as usize;
    if got != size {
        return Err(Error::ShortRead {
            expected: size,
            actual: got,
        });
    }

    parse_raw_smbios_data(Bytes::from(buffer))
}

#[cfg(not(windows))]
fn firmware_table() -> Result<RawTable> {
    Err(Error::SourceUnavailable)
}

#[cfg(unix)]
fn map_physical(pointer: &Pointer, mem: &str) -> Result<RawTable> {
    let address = pointer.address()?;

    let file = fs::File::open(mem).map_err(|err| Error::io(mem, err))?;
    let entry_point = read_entry_point(&file, address)?;

    let (table_address, max_size) = entry_point.table();
    tracing::debug!(
        version = ?entry_point.version(),
        table_address,
        max_size,
        "found SMBIOS 3 entry point"
    );

    map_table(&file, mem, table_address, max_size)
}

#[cfg(not(unix))]
fn map_physical(_pointer: &Pointer, _mem: &str) -> Result<RawTable> {
    Err(Error::SourceUnavailable)
}

/// Maps `size` bytes of `file` at `address` read-only. The mapping is kept
/// for as long as the returned table lives.
#[cfg(unix)]
pub fn map_table(
    file: &fs::File,
    path: impl AsRef<Path>,
    address: u64,
    size: usize,
) -> Result<RawTable> {
    if size == 0 {
        return Err(Error::EmptyTable);
    }

    // SAFETY: the mapping is read-only and firmware tables do not change
    // while the system is running.
    let mmap = unsafe {
        memmap2::MmapOptions::new()
            .offset(address)
            .len(size)
            .map(file)
    }
    .map_err(|err| Error::io(path.as_ref(), err))?;

    Ok(RawTable {
        storage: Storage::Mapped(mmap),
    })
}
