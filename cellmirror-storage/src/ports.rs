//! Read and write ports.
//!
//! The application reads through a [`ReadPort`] and writes through a
//! [`WritePort`]. Which backend sits behind each is decided once at startup
//! (mirror or direct, online or offline); callers never see the difference.
//!
//! Neither port returns errors. Reads come back empty or absent and writes
//! return `false`; the failure itself goes to the error sink.

use std::sync::Arc;

use async_trait::async_trait;
use cellmirror_core::{
    Cell, CellId, CellPartNoView, CellSwTestView, PcStation, RemoteError, SwTest, SwTestId, Tla,
    WriteCommand,
};

use crate::cache::ChangeNotifier;
use crate::notify::{report_error, ErrorSink};
use crate::remote::RemoteStore;

/// The 18 read operations the application uses.
///
/// Implemented by [`CacheReader`](crate::CacheReader) over the mirror and by
/// [`DirectReader`](crate::DirectReader) over the remote. Lists come back in a
/// stable order; `get_*` returns `None` both for a missing row and for a
/// failed read.
#[async_trait]
pub trait ReadPort: Send + Sync {
    /// All cells, ordered by name.
    async fn list_cells(&self) -> Vec<Cell>;
    async fn get_cell_by_id(&self, cell_id: CellId) -> Option<Cell>;
    /// Cells whose name starts with `prefix`, case-insensitively.
    async fn search_cells_by_name(&self, prefix: &str) -> Vec<Cell>;

    /// All PC stations, ordered by name.
    async fn list_pc_stations(&self) -> Vec<PcStation>;
    async fn get_pc_station(&self, pc_name: &str) -> Option<PcStation>;
    /// Cells linked to the station.
    async fn cells_for_pc_station(&self, pc_name: &str) -> Vec<Cell>;
    /// Stations the cell is linked to.
    async fn pc_stations_for_cell(&self, cell_id: CellId) -> Vec<PcStation>;

    async fn list_sw_tests(&self) -> Vec<SwTest>;
    async fn get_sw_test(&self, sw_test_id: SwTestId) -> Option<SwTest>;
    /// Every cell/software test link with display names.
    async fn sw_test_links(&self) -> Vec<CellSwTestView>;
    /// Software tests linked to the cell, with names and versions.
    async fn sw_tests_for_cell(&self, cell_id: CellId) -> Vec<CellSwTestView>;
    async fn cells_for_sw_test(&self, sw_test_id: SwTestId) -> Vec<Cell>;

    /// All top-level assemblies, ordered by part number.
    async fn list_tlas(&self) -> Vec<Tla>;
    async fn get_tla(&self, part_no: &str) -> Option<Tla>;
    /// Assemblies whose part number starts with `prefix`.
    async fn search_tlas_by_part_no(&self, prefix: &str) -> Vec<Tla>;
    /// Every cell/part number link with the assembly description.
    async fn part_no_links(&self) -> Vec<CellPartNoView>;
    async fn part_numbers_for_cell(&self, cell_id: CellId) -> Vec<CellPartNoView>;
    async fn cells_for_part_no(&self, part_no: &str) -> Vec<Cell>;
}

/// Implement [`ReadPort`] for a reader with inherent `rows` and `first`
/// methods, rendering every query against `$relations`.
macro_rules! impl_read_port {
    ($reader:ty, $relations:expr) => {
        #[async_trait::async_trait]
        impl $crate::ports::ReadPort for $reader {
            async fn list_cells(&self) -> Vec<cellmirror_core::Cell> {
                self.rows($crate::query::list_cells($relations)).await
            }
            async fn get_cell_by_id(&self, cell_id: cellmirror_core::CellId) -> Option<cellmirror_core::Cell> {
                self.first($crate::query::get_cell_by_id($relations, cell_id)).await
            }
            async fn search_cells_by_name(&self, prefix: &str) -> Vec<cellmirror_core::Cell> {
                self.rows($crate::query::search_cells_by_name($relations, prefix)).await
            }
            async fn list_pc_stations(&self) -> Vec<cellmirror_core::PcStation> {
                self.rows($crate::query::list_pc_stations($relations)).await
            }
            async fn get_pc_station(&self, pc_name: &str) -> Option<cellmirror_core::PcStation> {
                self.first($crate::query::get_pc_station($relations, pc_name)).await
            }
            async fn cells_for_pc_station(&self, pc_name: &str) -> Vec<cellmirror_core::Cell> {
                self.rows($crate::query::cells_for_pc_station($relations, pc_name)).await
            }
            async fn pc_stations_for_cell(&self, cell_id: cellmirror_core::CellId) -> Vec<cellmirror_core::PcStation> {
                self.rows($crate::query::pc_stations_for_cell($relations, cell_id)).await
            }
            async fn list_sw_tests(&self) -> Vec<cellmirror_core::SwTest> {
                self.rows($crate::query::list_sw_tests($relations)).await
            }
            async fn get_sw_test(&self, sw_test_id: cellmirror_core::SwTestId) -> Option<cellmirror_core::SwTest> {
                self.first($crate::query::get_sw_test($relations, sw_test_id)).await
            }
            async fn sw_test_links(&self) -> Vec<cellmirror_core::CellSwTestView> {
                self.rows($crate::query::sw_test_links($relations)).await
            }
            async fn sw_tests_for_cell(&self, cell_id: cellmirror_core::CellId) -> Vec<cellmirror_core::CellSwTestView> {
                self.rows($crate::query::sw_tests_for_cell($relations, cell_id)).await
            }
            async fn cells_for_sw_test(&self, sw_test_id: cellmirror_core::SwTestId) -> Vec<cellmirror_core::Cell> {
                self.rows($crate::query::cells_for_sw_test($relations, sw_test_id)).await
            }
            async fn list_tlas(&self) -> Vec<cellmirror_core::Tla> {
                self.rows($crate::query::list_tlas($relations)).await
            }
            async fn get_tla(&self, part_no: &str) -> Option<cellmirror_core::Tla> {
                self.first($crate::query::get_tla($relations, part_no)).await
            }
            async fn search_tlas_by_part_no(&self, prefix: &str) -> Vec<cellmirror_core::Tla> {
                self.rows($crate::query::search_tlas_by_part_no($relations, prefix)).await
            }
            async fn part_no_links(&self) -> Vec<cellmirror_core::CellPartNoView> {
                self.rows($crate::query::part_no_links($relations)).await
            }
            async fn part_numbers_for_cell(&self, cell_id: cellmirror_core::CellId) -> Vec<cellmirror_core::CellPartNoView> {
                self.rows($crate::query::part_numbers_for_cell($relations, cell_id)).await
            }
            async fn cells_for_part_no(&self, part_no: &str) -> Vec<cellmirror_core::Cell> {
                self.rows($crate::query::cells_for_part_no($relations, part_no)).await
            }
        }
    };
}

pub(crate) use impl_read_port;

// ============================================================================
// WRITERS
// ============================================================================

/// Mutations of the system of record.
#[async_trait]
pub trait WritePort: Send + Sync {
    /// Apply `command`. Returns `true` on success.
    async fn apply(&self, command: WriteCommand) -> bool;
}

/// Writes straight to the system of record.
#[derive(Clone)]
pub struct RemoteWriter {
    remote: Arc<dyn RemoteStore>,
    sink: Arc<dyn ErrorSink>,
}

impl RemoteWriter {
    /// Writer over `remote`; failed writes are reported to `sink`.
    pub fn new(remote: Arc<dyn RemoteStore>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { remote, sink }
    }
}

#[async_trait]
impl WritePort for RemoteWriter {
    async fn apply(&self, command: WriteCommand) -> bool {
        match self.remote.execute(&command).await {
            Ok(rows) => {
                tracing::debug!(operation = command.operation(), rows, "Remote write applied");
                true
            }
            Err(e) => {
                report_error(self.sink.as_ref(), command.operation(), e);
                false
            }
        }
    }
}

/// Decorates a writer: after each successful write, notifies the mirror of
/// the command's change event.
#[derive(Clone)]
pub struct MirroredWriter {
    inner: Arc<dyn WritePort>,
    notifier: ChangeNotifier,
}

impl MirroredWriter {
    pub fn new(inner: Arc<dyn WritePort>, notifier: ChangeNotifier) -> Self {
        Self { inner, notifier }
    }
}

#[async_trait]
impl WritePort for MirroredWriter {
    async fn apply(&self, command: WriteCommand) -> bool {
        let event = command.change_event();
        let applied = self.inner.apply(command).await;
        if applied {
            self.notifier.notify(&event);
        }
        applied
    }
}

/// Rejects every write while the system of record is unreachable.
#[derive(Clone)]
pub struct OfflineWriter {
    sink: Arc<dyn ErrorSink>,
}

impl OfflineWriter {
    pub fn new(sink: Arc<dyn ErrorSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl WritePort for OfflineWriter {
    async fn apply(&self, command: WriteCommand) -> bool {
        tracing::debug!(operation = command.operation(), "Write rejected in offline mode");
        self.sink.report(cellmirror_core::MirrorNotification::unexpected(
            command.operation(),
            RemoteError::Unreachable {
                reason: "offline mode".to_string(),
            },
        ));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::refresh_channel;
    use crate::notify::ChannelErrorSink;
    use crate::remote::RemoteSource;
    use cellmirror_core::{MirrorResult, MirroredTable};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyRemote {
        fail: AtomicBool,
    }

    #[async_trait]
    impl RemoteStore for FlakyRemote {
        async fn ping(&self) -> MirrorResult<()> {
            Ok(())
        }

        fn source_for(&self, table: MirroredTable) -> RemoteSource {
            RemoteSource::new("mem", table.source_relation())
        }

        async fn execute(&self, _command: &WriteCommand) -> MirrorResult<u64> {
            if self.fail.load(Ordering::SeqCst) {
                Err(RemoteError::WriteFailed {
                    reason: "constraint".to_string(),
                }
                .into())
            } else {
                Ok(1)
            }
        }
    }

    fn upsert_tla() -> WriteCommand {
        WriteCommand::UpsertTla(Tla {
            part_no: "900-1".to_string(),
            description: None,
            is_active: true,
        })
    }

    #[tokio::test]
    async fn test_mirrored_writer_notifies_on_success_only() {
        let remote = Arc::new(FlakyRemote {
            fail: AtomicBool::new(false),
        });
        let (sink, mut errors) = ChannelErrorSink::new();
        let sink: Arc<dyn ErrorSink> = Arc::new(sink);
        let (tx, mut rx) = refresh_channel();
        let writer = MirroredWriter::new(
            Arc::new(RemoteWriter::new(remote.clone(), Arc::clone(&sink))),
            ChangeNotifier::new(tx),
        );

        assert!(writer.apply(upsert_tla()).await);
        assert_eq!(rx.try_recv().unwrap().source(), "TlaChanged(900-1)");

        remote.fail.store(true, Ordering::SeqCst);
        assert!(!writer.apply(upsert_tla()).await);
        assert!(rx.try_recv().is_none());
        assert_eq!(errors.try_recv().unwrap().operation(), Some("upsert_tla"));
    }

    #[tokio::test]
    async fn test_offline_writer_rejects() {
        let (sink, mut errors) = ChannelErrorSink::new();
        let writer = OfflineWriter::new(Arc::new(sink));
        assert!(!writer.apply(upsert_tla()).await);
        assert_eq!(errors.try_recv().unwrap().operation(), Some("upsert_tla"));
    }
}
