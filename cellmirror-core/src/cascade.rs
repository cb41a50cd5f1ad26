//! Change events and the refresh cascade
//!
//! A write to the system of record is described by a [`ChangeEvent`]. The
//! tables that must be refreshed for each kind of event are a fixed data
//! table, [`CASCADE_RULES`], rather than logic spread over call sites.

use crate::{CellId, MirroredTable, SwTestId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload-free discriminant of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Cell row itself
    Cell,
    /// PC station row
    PcStation,
    /// Cell/PC station links
    PcStationCell,
    /// Software test row
    SwTest,
    /// Cell/software test links
    SwTestCell,
    /// Top-level assembly row
    Tla,
    /// Cell/part number links
    TlaCell,
}

/// Event kind to refreshed tables. Order within a row is refresh order.
pub const CASCADE_RULES: &[(ChangeKind, &[MirroredTable])] = &[
    (
        ChangeKind::Cell,
        &[
            MirroredTable::Cell,
            MirroredTable::CellByPcStation,
            MirroredTable::CellBySwTest,
            MirroredTable::CellBySwTestView,
            MirroredTable::CellByPartNo,
            MirroredTable::CellByPartNoView,
        ],
    ),
    (ChangeKind::PcStation, &[MirroredTable::PcStation]),
    (ChangeKind::PcStationCell, &[MirroredTable::CellByPcStation]),
    (
        ChangeKind::SwTest,
        &[
            MirroredTable::SwTestMap,
            MirroredTable::CellBySwTest,
            MirroredTable::CellBySwTestView,
        ],
    ),
    (
        ChangeKind::SwTestCell,
        &[MirroredTable::CellBySwTest, MirroredTable::CellBySwTestView],
    ),
    (
        ChangeKind::Tla,
        &[
            MirroredTable::Tla,
            MirroredTable::CellByPartNo,
            MirroredTable::CellByPartNoView,
        ],
    ),
    (
        ChangeKind::TlaCell,
        &[MirroredTable::CellByPartNo, MirroredTable::CellByPartNoView],
    ),
];

impl ChangeKind {
    /// Every kind, in declaration order.
    pub const ALL: [ChangeKind; 7] = [
        ChangeKind::Cell,
        ChangeKind::PcStation,
        ChangeKind::PcStationCell,
        ChangeKind::SwTest,
        ChangeKind::SwTestCell,
        ChangeKind::Tla,
        ChangeKind::TlaCell,
    ];

    /// Tables refreshed when an event of this kind happens.
    pub fn cascade(&self) -> &'static [MirroredTable] {
        CASCADE_RULES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, tables)| *tables)
            .unwrap_or(&[])
    }
}

/// A mutation of the system of record that invalidates mirrored tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// Cell added, edited or removed.
    CellChanged(CellId),
    /// PC station added, edited or removed, keyed by name.
    PcStationChanged(String),
    /// Links of one PC station changed.
    PcStationCellChanged(String),
    /// Software test added, edited or removed.
    SwTestChanged(SwTestId),
    /// Links of one software test changed.
    SwTestCellChanged(SwTestId),
    /// Assembly added, edited or removed, keyed by part number.
    TlaChanged(String),
    /// Links of one part number changed.
    TlaCellChanged(String),
}

impl ChangeEvent {
    /// Discriminant, used to look up the cascade.
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::CellChanged(_) => ChangeKind::Cell,
            ChangeEvent::PcStationChanged(_) => ChangeKind::PcStation,
            ChangeEvent::PcStationCellChanged(_) => ChangeKind::PcStationCell,
            ChangeEvent::SwTestChanged(_) => ChangeKind::SwTest,
            ChangeEvent::SwTestCellChanged(_) => ChangeKind::SwTestCell,
            ChangeEvent::TlaChanged(_) => ChangeKind::Tla,
            ChangeEvent::TlaCellChanged(_) => ChangeKind::TlaCell,
        }
    }

    /// Tables to refresh, in order. See [`CASCADE_RULES`].
    pub fn cascade(&self) -> &'static [MirroredTable] {
        self.kind().cascade()
    }

    /// Diagnostic tag carried on the refresh request, e.g. `CellChanged(42)`.
    pub fn source_tag(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::CellChanged(id) => write!(f, "CellChanged({})", id),
            ChangeEvent::PcStationChanged(name) => write!(f, "PcStationChanged({})", name),
            ChangeEvent::PcStationCellChanged(name) => write!(f, "PcStationCellChanged({})", name),
            ChangeEvent::SwTestChanged(id) => write!(f, "SwTestChanged({})", id),
            ChangeEvent::SwTestCellChanged(id) => write!(f, "SwTestCellChanged({})", id),
            ChangeEvent::TlaChanged(part_no) => write!(f, "TlaChanged({})", part_no),
            ChangeEvent::TlaCellChanged(part_no) => write!(f, "TlaCellChanged({})", part_no),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cascade_table_exact() {
        use MirroredTable::*;
        assert_eq!(
            ChangeKind::Cell.cascade(),
            &[
                Cell,
                CellByPcStation,
                CellBySwTest,
                CellBySwTestView,
                CellByPartNo,
                CellByPartNoView
            ]
        );
        assert_eq!(ChangeKind::PcStation.cascade(), &[PcStation]);
        assert_eq!(ChangeKind::PcStationCell.cascade(), &[CellByPcStation]);
        assert_eq!(
            ChangeKind::SwTest.cascade(),
            &[SwTestMap, CellBySwTest, CellBySwTestView]
        );
        assert_eq!(
            ChangeKind::SwTestCell.cascade(),
            &[CellBySwTest, CellBySwTestView]
        );
        assert_eq!(
            ChangeKind::Tla.cascade(),
            &[Tla, CellByPartNo, CellByPartNoView]
        );
        assert_eq!(
            ChangeKind::TlaCell.cascade(),
            &[CellByPartNo, CellByPartNoView]
        );
    }

    #[test]
    fn test_every_kind_has_exactly_one_rule() {
        for kind in ChangeKind::ALL {
            let rules = CASCADE_RULES.iter().filter(|(k, _)| *k == kind).count();
            assert_eq!(rules, 1, "{:?}", kind);
            assert!(!kind.cascade().is_empty());
        }
    }

    #[test]
    fn test_source_tag_format() {
        assert_eq!(ChangeEvent::CellChanged(42).source_tag(), "CellChanged(42)");
        assert_eq!(
            ChangeEvent::TlaChanged("900-1234".to_string()).source_tag(),
            "TlaChanged(900-1234)"
        );
    }

    fn arb_event() -> impl Strategy<Value = ChangeEvent> {
        prop_oneof![
            any::<i64>().prop_map(ChangeEvent::CellChanged),
            "[A-Z0-9-]{1,12}".prop_map(ChangeEvent::PcStationChanged),
            "[A-Z0-9-]{1,12}".prop_map(ChangeEvent::PcStationCellChanged),
            any::<i64>().prop_map(ChangeEvent::SwTestChanged),
            any::<i64>().prop_map(ChangeEvent::SwTestCellChanged),
            "[A-Z0-9-]{1,12}".prop_map(ChangeEvent::TlaChanged),
            "[A-Z0-9-]{1,12}".prop_map(ChangeEvent::TlaCellChanged),
        ]
    }

    proptest! {
        #[test]
        fn prop_cascade_has_no_duplicates(event in arb_event()) {
            let tables = event.cascade();
            let mut deduped = tables.to_vec();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), tables.len());
        }

        #[test]
        fn prop_source_tag_carries_payload(id in any::<i64>()) {
            let tag = ChangeEvent::CellChanged(id).source_tag();
            prop_assert!(tag.contains(&id.to_string()));
        }
    }
}
