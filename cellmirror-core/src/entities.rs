//! Cached row records
//!
//! One struct per mirrored table, fields in the table's column order. A row
//! reflects whatever the last completed refresh wrote; there is no version
//! or timestamp on it.

use crate::MirroredTable;
use serde::{Deserialize, Serialize};

/// Cell identifier in the system of record.
pub type CellId = i64;

/// Software test identifier in the system of record.
pub type SwTestId = i64;

/// A test cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: CellId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// A PC station that hosts test cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcStation {
    pub pc_name: String,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// PC station to cell assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPcStation {
    pub pc_name: String,
    pub cell_id: CellId,
}

/// A software test definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwTest {
    pub sw_test_id: SwTestId,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Software test to cell assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellSwTest {
    pub sw_test_id: SwTestId,
    pub cell_id: CellId,
}

/// Software test to cell assignment, denormalized with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSwTestView {
    pub sw_test_id: SwTestId,
    pub cell_id: CellId,
    pub sw_test_name: Option<String>,
    pub sw_test_version: Option<String>,
    pub cell_name: Option<String>,
}

/// A top-level assembly identified by part number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tla {
    pub part_no: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// Part number to cell assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPartNo {
    pub part_no: String,
    pub cell_id: CellId,
}

/// Part number to cell assignment, denormalized with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPartNoView {
    pub part_no: String,
    pub cell_id: CellId,
    pub tla_description: Option<String>,
    pub cell_name: Option<String>,
}

/// Associates a row record with the table it is read from.
pub trait TableRecord {
    const TABLE: MirroredTable;
}

macro_rules! table_record {
    ($($ty:ty => $table:expr),* $(,)?) => {
        $(
            impl TableRecord for $ty {
                const TABLE: MirroredTable = $table;
            }
        )*
    };
}

table_record! {
    Cell => MirroredTable::Cell,
    PcStation => MirroredTable::PcStation,
    CellPcStation => MirroredTable::CellByPcStation,
    SwTest => MirroredTable::SwTestMap,
    CellSwTest => MirroredTable::CellBySwTest,
    CellSwTestView => MirroredTable::CellBySwTestView,
    Tla => MirroredTable::Tla,
    CellPartNo => MirroredTable::CellByPartNo,
    CellPartNoView => MirroredTable::CellByPartNoView,
}
