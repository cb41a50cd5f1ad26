//! Property tests for change notification and write-command cascades.

use cellmirror_storage::cache::refresh_channel;
use cellmirror_storage::ChangeNotifier;
use cellmirror_test_utils::generators::{arb_change_event, arb_write_command};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_each_event_enqueues_exactly_its_cascade(event in arb_change_event()) {
        let (tx, mut rx) = refresh_channel();
        let notifier = ChangeNotifier::new(tx.clone());

        notifier.notify(&event);

        let request = rx.try_recv().expect("one request");
        prop_assert_eq!(request.tables(), event.cascade());
        prop_assert_eq!(request.source(), event.source_tag());
        prop_assert!(rx.try_recv().is_none());
        prop_assert_eq!(tx.metrics().requests_enqueued, 1);
    }

    #[test]
    fn prop_write_commands_map_to_matching_event(command in arb_write_command()) {
        let event = command.change_event();
        let cascade = event.cascade();
        prop_assert!(!cascade.is_empty());
        match &command {
            cellmirror_core::WriteCommand::UpsertCell(cell) => {
                prop_assert_eq!(event, cellmirror_core::ChangeEvent::CellChanged(cell.cell_id));
            }
            cellmirror_core::WriteCommand::AssignCellToPcStation { pc_name, .. }
            | cellmirror_core::WriteCommand::UnassignCellFromPcStation { pc_name, .. } => {
                prop_assert_eq!(event, cellmirror_core::ChangeEvent::PcStationCellChanged(pc_name.clone()));
            }
            _ => {}
        }
    }
}
