//! Execution context

use std::sync::Arc;

use uuid::Uuid;

use super::cursor::CancellationToken;
use super::errors::{ExecutorError, ExecutorResult};
use crate::observability::{Logger, MetricsRegistry};
use crate::schema::{IndexCatalog, RecordType};
use crate::storage::{ReadConsistency, RecordStore};

/// Everything a plan needs to run: the store it reads, the catalog it was
/// planned against and per-request settings.
///
/// The context pins a [`RecordStore::snapshot`] view when created. Every
/// cursor built from it reads that one state, so commits that land while
/// a cursor streams are never observed.
pub struct ExecuteContext<'a> {
    store: Box<dyn RecordStore + 'a>,
    catalog: &'a dyn IndexCatalog,
    record_type: Arc<RecordType>,
    consistency: ReadConsistency,
    cancel: CancellationToken,
    request_id: Uuid,
    logger: Logger,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<'a> ExecuteContext<'a> {
    /// Context for plans over `record_type`, with a fresh request id
    pub fn new(
        store: &'a dyn RecordStore,
        catalog: &'a dyn IndexCatalog,
        record_type: &str,
    ) -> ExecutorResult<Self> {
        let record_type = catalog
            .record_type(record_type)
            .ok_or_else(|| ExecutorError::invalid_plan(format!("Unknown record type '{}'", record_type)))?;
        Ok(Self {
            store: store.snapshot(),
            catalog,
            record_type,
            consistency: ReadConsistency::default(),
            cancel: CancellationToken::new(),
            request_id: Uuid::new_v4(),
            logger: Logger::default(),
            metrics: None,
        })
    }

    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The pinned read view
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn catalog(&self) -> &'a dyn IndexCatalog {
        self.catalog
    }

    pub fn record_type(&self) -> &Arc<RecordType> {
        &self.record_type
    }

    pub fn consistency(&self) -> ReadConsistency {
        self.consistency
    }

    /// Token checked by every cursor on every pull
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }
}
