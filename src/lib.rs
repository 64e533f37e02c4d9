//! Locates the System Management BIOS (SMBIOS) structure table on the
//! running system and indexes its structures by type.
//!
//! The table is acquired from the first strategy that works on this
//! platform: the kernel's pre-assembled DMI table file, the firmware table
//! API, or a read-only mapping of physical memory found through the SMBIOS 3
//! entry point. Acquisition and indexing happen once per process.
//!
//! ```no_run
//! if let Some(table) = smbios_table::type_index() {
//!     if let Some(system) = table.get(1) {
//!         let vendor = system.string_at(0x04).unwrap_or_default();
//!         if smbios_table::is_significant(&vendor) {
//!             println!("vendor: {}", vendor);
//!         }
//!     }
//! }
//! ```

pub mod dmi;
pub mod entry_point;
mod error;
pub mod index;
pub mod sanitize;
pub mod source;
pub mod structure;

pub use crate::entry_point::EntryPoint;
pub use crate::error::{Error, Result};
pub use crate::index::{Smbios, Table, TypeIndex};
pub use crate::sanitize::is_significant;
pub use crate::source::{PlatformSource, RawTable, Source, Strategy};
pub use crate::structure::{Header, Structure, Structures, END_OF_TABLE};

static SMBIOS: Smbios<PlatformSource> = Smbios::new(PlatformSource);

/// Returns this system's SMBIOS table, acquiring and indexing it on first
/// call. `None` means SMBIOS data is unavailable for the rest of the
/// process; see [`smbios`] for the reason.
pub fn type_index() -> Option<&'static Table> {
    SMBIOS.index()
}

/// The process-wide [`Smbios`] backing [`type_index`].
pub fn smbios() -> &'static Smbios<PlatformSource> {
    &SMBIOS
}
