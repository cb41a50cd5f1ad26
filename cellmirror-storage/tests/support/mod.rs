//! Shared harness: seeded remote, real embedded store, instrumented refresh
//! path and a recording sink.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cellmirror_core::MirroredTable;
use cellmirror_storage::{
    BootstrapPopulator, CacheReader, DirectReader, MirrorStore, RefreshQueue, SqliteMirrorStore,
    StoreHandle, TableGate, TableRefresher,
};
use cellmirror_test_utils::fixtures::RemoteFixture;
use cellmirror_test_utils::mocks::{InstrumentedStore, RecordingSink};

pub struct Harness {
    pub fixture: RemoteFixture,
    pub handle: StoreHandle,
    pub mirror: SqliteMirrorStore,
    pub store: Arc<InstrumentedStore>,
    pub gate: TableGate,
    pub refresher: TableRefresher,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_delay(Duration::ZERO).await
    }

    pub async fn with_delay(delay: Duration) -> Self {
        Self::over(RemoteFixture::seeded(), delay).await
    }

    pub async fn over(fixture: RemoteFixture, delay: Duration) -> Self {
        let handle = StoreHandle::open_at(fixture.store_path(), None)
            .await
            .expect("open embedded store");
        let mirror = SqliteMirrorStore::new(handle.connection());
        let store = Arc::new(InstrumentedStore::new(Arc::new(mirror.clone())).with_delay(delay));
        let gate = TableGate::new();
        let refresher = TableRefresher::new(gate.clone(), store.clone(), Arc::new(fixture.remote()));
        Self {
            fixture,
            handle,
            mirror,
            store,
            gate,
            refresher,
            sink: RecordingSink::new(),
        }
    }

    pub fn populator(&self) -> BootstrapPopulator {
        BootstrapPopulator::new(self.refresher.clone(), self.sink.clone())
    }

    pub fn queue(&self) -> RefreshQueue {
        RefreshQueue::new(self.refresher.clone(), self.sink.clone())
    }

    pub fn reader(&self) -> CacheReader {
        CacheReader::new(self.gate.clone(), self.mirror.clone(), self.sink.clone())
    }

    pub fn direct(&self) -> DirectReader {
        DirectReader::new(self.fixture.remote(), self.sink.clone())
    }

    pub async fn mirror_count(&self, table: MirroredTable) -> u64 {
        self.mirror.row_count(table).await.expect("count mirror rows")
    }

    pub async fn mirror_counts(&self) -> Vec<(MirroredTable, u64)> {
        let mut counts = Vec::new();
        for table in MirroredTable::ALL {
            counts.push((table, self.mirror_count(table).await));
        }
        counts
    }
}
