//! Write commands against the system of record

use crate::{Cell, CellId, ChangeEvent, PcStation, SwTest, SwTestId, Tla};
use serde::{Deserialize, Serialize};

/// A single mutation applied to the system of record.
///
/// Every command implies exactly one [`ChangeEvent`], which is what the
/// mirror uses to decide which cached tables go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WriteCommand {
    /// Insert or replace a cell by id.
    UpsertCell(Cell),
    /// Insert or replace a PC station by name.
    UpsertPcStation(PcStation),
    /// Link a cell to a station. Linking twice is a no-op.
    AssignCellToPcStation { pc_name: String, cell_id: CellId },
    /// Remove a cell/station link, if present.
    UnassignCellFromPcStation { pc_name: String, cell_id: CellId },
    /// Insert or replace a software test by id.
    UpsertSwTest(SwTest),
    AssignCellToSwTest { sw_test_id: SwTestId, cell_id: CellId },
    UnassignCellFromSwTest { sw_test_id: SwTestId, cell_id: CellId },
    /// Insert or replace an assembly by part number.
    UpsertTla(Tla),
    /// Link a cell to a part number.
    AssignCellToPartNo { part_no: String, cell_id: CellId },
    UnassignCellFromPartNo { part_no: String, cell_id: CellId },
}

impl WriteCommand {
    /// The event whose cascade covers every mirrored table this command
    /// can change.
    pub fn change_event(&self) -> ChangeEvent {
        match self {
            WriteCommand::UpsertCell(cell) => ChangeEvent::CellChanged(cell.cell_id),
            WriteCommand::UpsertPcStation(station) => {
                ChangeEvent::PcStationChanged(station.pc_name.clone())
            }
            WriteCommand::AssignCellToPcStation { pc_name, .. }
            | WriteCommand::UnassignCellFromPcStation { pc_name, .. } => {
                ChangeEvent::PcStationCellChanged(pc_name.clone())
            }
            WriteCommand::UpsertSwTest(test) => ChangeEvent::SwTestChanged(test.sw_test_id),
            WriteCommand::AssignCellToSwTest { sw_test_id, .. }
            | WriteCommand::UnassignCellFromSwTest { sw_test_id, .. } => {
                ChangeEvent::SwTestCellChanged(*sw_test_id)
            }
            WriteCommand::UpsertTla(tla) => ChangeEvent::TlaChanged(tla.part_no.clone()),
            WriteCommand::AssignCellToPartNo { part_no, .. }
            | WriteCommand::UnassignCellFromPartNo { part_no, .. } => {
                ChangeEvent::TlaCellChanged(part_no.clone())
            }
        }
    }

    /// Operation name used when reporting a failed write.
    pub fn operation(&self) -> &'static str {
        match self {
            WriteCommand::UpsertCell(_) => "upsert_cell",
            WriteCommand::UpsertPcStation(_) => "upsert_pc_station",
            WriteCommand::AssignCellToPcStation { .. } => "assign_cell_to_pc_station",
            WriteCommand::UnassignCellFromPcStation { .. } => "unassign_cell_from_pc_station",
            WriteCommand::UpsertSwTest(_) => "upsert_sw_test",
            WriteCommand::AssignCellToSwTest { .. } => "assign_cell_to_sw_test",
            WriteCommand::UnassignCellFromSwTest { .. } => "unassign_cell_from_sw_test",
            WriteCommand::UpsertTla(_) => "upsert_tla",
            WriteCommand::AssignCellToPartNo { .. } => "assign_cell_to_part_no",
            WriteCommand::UnassignCellFromPartNo { .. } => "unassign_cell_from_part_no",
        }
    }
}
