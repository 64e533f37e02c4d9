//! The type index over an acquired table, and its once-per-process cache.

use std::fmt;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::source::{RawTable, Source};
use crate::structure::{Structure, Structures};

/// Offset of the first structure of each type in a table.
///
/// Only the first structure of a type is recorded. The end-of-table type is
/// never recorded since the walk stops there.
#[derive(Clone, PartialEq, Eq)]
pub struct TypeIndex {
    first: [Option<usize>; 256],
}

impl TypeIndex {
    /// Walks `buf` once and records the first structure of every type.
    ///
    /// A malformed structure stops the walk; structures indexed before it are
    /// kept and the error is returned alongside.
    pub fn build(buf: &[u8]) -> (TypeIndex, Option<Error>) {
        let mut index = TypeIndex {
            first: [None; 256],
        };

        for structure in Structures::new(buf) {
            match structure {
                Ok(structure) => {
                    let slot = &mut index.first[structure.header.header_type as usize];
                    if slot.is_none() {
                        *slot = Some(structure.offset());
                    }
                }
                Err(err) => return (index, Some(err)),
            }
        }

        (index, None)
    }

    /// Offset of the first structure of `header_type`.
    pub fn offset(&self, header_type: u8) -> Option<usize> {
        self.first[header_type as usize]
    }

    /// Number of distinct structure types present.
    pub fn len(&self) -> usize {
        self.first.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(type, offset)` pairs in type order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.first
            .iter()
            .enumerate()
            .filter_map(|(header_type, slot)| slot.map(|offset| (header_type as u8, offset)))
    }
}

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// An acquired SMBIOS table together with its type index.
#[derive(Debug)]
pub struct Table {
    raw: RawTable,
    index: TypeIndex,
}

impl Table {
    /// Indexes `raw`. An empty buffer is [`Error::EmptyTable`]; a malformed
    /// stream is logged and whatever was indexed before it is kept.
    pub fn new(raw: RawTable) -> Result<Table> {
        if raw.is_empty() {
            return Err(Error::EmptyTable);
        }

        let (index, err) = TypeIndex::build(&raw);
        if let Some(err) = err {
            tracing::warn!(%err, "stopped walking SMBIOS table early");
        }

        tracing::info!(
            len = raw.len(),
            types = index.len(),
            "indexed SMBIOS table"
        );

        Ok(Table { raw, index })
    }

    /// The first structure of `header_type`.
    pub fn get(&self, header_type: u8) -> Option<Structure<'_>> {
        let offset = self.index.offset(header_type)?;
        // Offsets in the index were produced by walking this same buffer.
        Structure::parse(&self.raw, offset).ok()
    }

    /// Walks every structure in the table from the start.
    pub fn structures(&self) -> Structures<'_> {
        Structures::new(&self.raw)
    }

    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Lazily acquires and indexes a table from a [`Source`], at most once.
///
/// Concurrent first callers block until the single acquisition completes;
/// every caller then observes the same table or the same error. Failures
/// are cached too and never retried.
pub struct Smbios<S> {
    source: S,
    table: OnceLock<Result<Table>>,
}

impl<S: Source> Smbios<S> {
    pub const fn new(source: S) -> Self {
        Smbios {
            source,
            table: OnceLock::new(),
        }
    }

    /// Acquires and indexes the table on first use.
    pub fn table(&self) -> std::result::Result<&Table, &Error> {
        self.table
            .get_or_init(|| {
                let table = self.source.acquire().and_then(Table::new);
                if let Err(err) = &table {
                    tracing::debug!(%err, "SMBIOS table unavailable");
                }
                table
            })
            .as_ref()
    }

    /// The table, or `None` if it could not be acquired.
    pub fn index(&self) -> Option<&Table> {
        self.table().ok()
    }

    /// Drops the cached outcome so the next call acquires again.
    pub fn reset(&mut self) {
        self.table.take();
    }
}

impl<S: fmt::Debug> fmt::Debug for Smbios<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Smbios")
            .field("source", &self.source)
            .field("table", &self.table.get())
            .finish()
    }
}
