//! Change notifier: write events in, refresh requests out.

use cellmirror_core::{CellId, ChangeEvent, RefreshRequest, SwTestId};

use super::queue::RefreshSender;

/// Turns system-of-record writes into refresh requests.
///
/// Each call enqueues exactly one request carrying the event's cascade.
/// Bursts are not coalesced; redundant refreshes are harmless.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: RefreshSender,
}

impl ChangeNotifier {
    /// Notifier feeding the queue behind `sender`.
    pub fn new(sender: RefreshSender) -> Self {
        Self { sender }
    }

    /// Enqueue the cascade of `event`. Never blocks; dropped silently once
    /// the queue is stopped.
    pub fn notify(&self, event: &ChangeEvent) {
        let request = RefreshRequest::for_event(event);
        tracing::debug!(
            request_id = %request.id(),
            source = %request.source(),
            tables = request.tables().len(),
            "Change notified"
        );
        self.sender.enqueue(request);
    }

    /// A cell row changed. Refreshes the cell table and every link table or
    /// view that carries cell data.
    pub fn cell_changed(&self, cell_id: CellId) {
        self.notify(&ChangeEvent::CellChanged(cell_id));
    }

    /// A PC station row changed.
    pub fn pc_station_changed(&self, pc_name: impl Into<String>) {
        self.notify(&ChangeEvent::PcStationChanged(pc_name.into()));
    }

    /// Cells were linked to or unlinked from a PC station.
    pub fn pc_station_cell_changed(&self, pc_name: impl Into<String>) {
        self.notify(&ChangeEvent::PcStationCellChanged(pc_name.into()));
    }

    /// A software test row changed, including its view rows.
    pub fn sw_test_changed(&self, sw_test_id: SwTestId) {
        self.notify(&ChangeEvent::SwTestChanged(sw_test_id));
    }

    /// Cells were linked to or unlinked from a software test.
    pub fn sw_test_cell_changed(&self, sw_test_id: SwTestId) {
        self.notify(&ChangeEvent::SwTestCellChanged(sw_test_id));
    }

    /// A top-level assembly row changed.
    pub fn tla_changed(&self, part_no: impl Into<String>) {
        self.notify(&ChangeEvent::TlaChanged(part_no.into()));
    }

    /// Cells were linked to or unlinked from a part number.
    pub fn tla_cell_changed(&self, part_no: impl Into<String>) {
        self.notify(&ChangeEvent::TlaCellChanged(part_no.into()));
    }
}
