//! Row mappers for cached records.

use cellmirror_core::{
    Cell, CellPartNo, CellPartNoView, CellPcStation, CellSwTest, CellSwTestView, PcStation,
    SwTest, TableRecord, Tla,
};
use rusqlite::Row;

/// A record that can be built from one result row of its table.
///
/// Columns are read by name, so the same mapper works for the local table
/// and for its remote source.
pub trait CachedRow: TableRecord + Sized + Send + 'static {
    /// Build the record from `row`. Fails if a column is missing or has an
    /// incompatible type.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl CachedRow for Cell {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            cell_id: row.get("cell_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            is_active: row.get("is_active")?,
        })
    }
}

impl CachedRow for PcStation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            pc_name: row.get("pc_name")?,
            location: row.get("location")?,
            description: row.get("description")?,
        })
    }
}

impl CachedRow for CellPcStation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            pc_name: row.get("pc_name")?,
            cell_id: row.get("cell_id")?,
        })
    }
}

impl CachedRow for SwTest {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sw_test_id: row.get("sw_test_id")?,
            name: row.get("name")?,
            version: row.get("version")?,
            description: row.get("description")?,
        })
    }
}

impl CachedRow for CellSwTest {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sw_test_id: row.get("sw_test_id")?,
            cell_id: row.get("cell_id")?,
        })
    }
}

impl CachedRow for CellSwTestView {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sw_test_id: row.get("sw_test_id")?,
            cell_id: row.get("cell_id")?,
            sw_test_name: row.get("sw_test_name")?,
            sw_test_version: row.get("sw_test_version")?,
            cell_name: row.get("cell_name")?,
        })
    }
}

impl CachedRow for Tla {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            part_no: row.get("part_no")?,
            description: row.get("description")?,
            is_active: row.get("is_active")?,
        })
    }
}

impl CachedRow for CellPartNo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            part_no: row.get("part_no")?,
            cell_id: row.get("cell_id")?,
        })
    }
}

impl CachedRow for CellPartNoView {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            part_no: row.get("part_no")?,
            cell_id: row.get("cell_id")?,
            tla_description: row.get("tla_description")?,
            cell_name: row.get("cell_name")?,
        })
    }
}
