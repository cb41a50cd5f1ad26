//! Mirrored table catalogue
//!
//! The nine cache tables are a closed set. Each one knows its remote source
//! relation and its column layout; the layout is shared by the local table
//! and the remote relation so a bulk scan can copy columns one-to-one.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL storage class of a mirrored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// One column of a mirrored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column name, identical locally and remotely.
    pub name: &'static str,
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

const fn required(name: &'static str, column_type: ColumnType) -> Column {
    Column {
        name,
        column_type,
        nullable: false,
    }
}

const fn optional(name: &'static str, column_type: ColumnType) -> Column {
    Column {
        name,
        column_type,
        nullable: true,
    }
}

use ColumnType::{Integer, Text};

const CELL_COLUMNS: &[Column] = &[
    required("cell_id", Integer),
    required("name", Text),
    optional("description", Text),
    required("is_active", Integer),
];

const PC_STATION_COLUMNS: &[Column] = &[
    required("pc_name", Text),
    optional("location", Text),
    optional("description", Text),
];

const CELL_BY_PC_STATION_COLUMNS: &[Column] =
    &[required("pc_name", Text), required("cell_id", Integer)];

const SW_TEST_MAP_COLUMNS: &[Column] = &[
    required("sw_test_id", Integer),
    required("name", Text),
    optional("version", Text),
    optional("description", Text),
];

const CELL_BY_SW_TEST_COLUMNS: &[Column] =
    &[required("sw_test_id", Integer), required("cell_id", Integer)];

const CELL_BY_SW_TEST_VIEW_COLUMNS: &[Column] = &[
    required("sw_test_id", Integer),
    required("cell_id", Integer),
    optional("sw_test_name", Text),
    optional("sw_test_version", Text),
    optional("cell_name", Text),
];

const TLA_COLUMNS: &[Column] = &[
    required("part_no", Text),
    optional("description", Text),
    required("is_active", Integer),
];

const CELL_BY_PART_NO_COLUMNS: &[Column] =
    &[required("part_no", Text), required("cell_id", Integer)];

const CELL_BY_PART_NO_VIEW_COLUMNS: &[Column] = &[
    required("part_no", Text),
    required("cell_id", Integer),
    optional("tla_description", Text),
    optional("cell_name", Text),
];

/// A logical cache table mirrored from the system of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MirroredTable {
    Cell,
    #[serde(rename = "PCStation")]
    PcStation,
    #[serde(rename = "CellByPCStation")]
    CellByPcStation,
    SwTestMap,
    CellBySwTest,
    /// Cell/software test links joined with both names.
    CellBySwTestView,
    #[serde(rename = "TLA")]
    Tla,
    CellByPartNo,
    /// Cell/part number links joined with the assembly description.
    CellByPartNoView,
}

impl MirroredTable {
    /// Every mirrored table, in bootstrap order.
    pub const ALL: [MirroredTable; 9] = [
        MirroredTable::Cell,
        MirroredTable::PcStation,
        MirroredTable::CellByPcStation,
        MirroredTable::SwTestMap,
        MirroredTable::CellBySwTest,
        MirroredTable::CellBySwTestView,
        MirroredTable::Tla,
        MirroredTable::CellByPartNo,
        MirroredTable::CellByPartNoView,
    ];

    /// Local table name in the embedded store.
    pub fn as_str(&self) -> &'static str {
        match self {
            MirroredTable::Cell => "Cell",
            MirroredTable::PcStation => "PCStation",
            MirroredTable::CellByPcStation => "CellByPCStation",
            MirroredTable::SwTestMap => "SwTestMap",
            MirroredTable::CellBySwTest => "CellBySwTest",
            MirroredTable::CellBySwTestView => "CellBySwTestView",
            MirroredTable::Tla => "TLA",
            MirroredTable::CellByPartNo => "CellByPartNo",
            MirroredTable::CellByPartNoView => "CellByPartNoView",
        }
    }

    /// Remote table or view that feeds this table.
    pub fn source_relation(&self) -> &'static str {
        match self {
            MirroredTable::Cell => "cell",
            MirroredTable::PcStation => "pc_station",
            MirroredTable::CellByPcStation => "cell_pc_station",
            MirroredTable::SwTestMap => "sw_test",
            MirroredTable::CellBySwTest => "cell_sw_test",
            MirroredTable::CellBySwTestView => "v_cell_sw_test",
            MirroredTable::Tla => "tla",
            MirroredTable::CellByPartNo => "cell_part_no",
            MirroredTable::CellByPartNoView => "v_cell_part_no",
        }
    }

    /// Column layout, shared by the local table and its remote source.
    pub fn columns(&self) -> &'static [Column] {
        match self {
            MirroredTable::Cell => CELL_COLUMNS,
            MirroredTable::PcStation => PC_STATION_COLUMNS,
            MirroredTable::CellByPcStation => CELL_BY_PC_STATION_COLUMNS,
            MirroredTable::SwTestMap => SW_TEST_MAP_COLUMNS,
            MirroredTable::CellBySwTest => CELL_BY_SW_TEST_COLUMNS,
            MirroredTable::CellBySwTestView => CELL_BY_SW_TEST_VIEW_COLUMNS,
            MirroredTable::Tla => TLA_COLUMNS,
            MirroredTable::CellByPartNo => CELL_BY_PART_NO_COLUMNS,
            MirroredTable::CellByPartNoView => CELL_BY_PART_NO_VIEW_COLUMNS,
        }
    }

    /// Comma-separated column list in layout order.
    pub fn column_list(&self) -> String {
        self.columns()
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Column list qualified with a table alias, e.g. `c.cell_id, c.name`.
    pub fn qualified_column_list(&self, alias: &str) -> String {
        self.columns()
            .iter()
            .map(|c| format!("{}.{}", alias, c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// DDL creating a table with this layout under `relation`.
    pub fn create_table_sql(&self, relation: &str) -> String {
        let columns = self
            .columns()
            .iter()
            .map(|c| {
                if c.nullable {
                    format!("{} {}", c.name, c.column_type.as_sql())
                } else {
                    format!("{} {} NOT NULL", c.name, c.column_type.as_sql())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", relation, columns)
    }

    /// Parse from the local table name.
    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        MirroredTable::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownTable {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for MirroredTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MirroredTable {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

impl AsRef<str> for MirroredTable {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_tables_unique() {
        let names: HashSet<_> = MirroredTable::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(names.len(), 9);
        let sources: HashSet<_> = MirroredTable::ALL
            .iter()
            .map(|t| t.source_relation())
            .collect();
        assert_eq!(sources.len(), 9);
    }

    #[test]
    fn test_parse_round_trip_and_case() {
        for table in MirroredTable::ALL {
            assert_eq!(table.as_str().parse::<MirroredTable>(), Ok(table));
        }
        assert_eq!("pcstation".parse::<MirroredTable>(), Ok(MirroredTable::PcStation));
        assert!(matches!(
            "Nope".parse::<MirroredTable>(),
            Err(ValidationError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_serde_uses_local_names() {
        let json = serde_json::to_string(&MirroredTable::CellByPcStation).unwrap();
        assert_eq!(json, "\"CellByPCStation\"");
        let back: MirroredTable = serde_json::from_str("\"TLA\"").unwrap();
        assert_eq!(back, MirroredTable::Tla);
    }

    #[test]
    fn test_create_table_sql() {
        let sql = MirroredTable::CellByPartNo.create_table_sql("CellByPartNo");
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"CellByPartNo\" (part_no TEXT NOT NULL, cell_id INTEGER NOT NULL)"
        );
    }

    #[test]
    fn test_qualified_columns() {
        assert_eq!(
            MirroredTable::Cell.qualified_column_list("c"),
            "c.cell_id, c.name, c.description, c.is_active"
        );
    }
}
