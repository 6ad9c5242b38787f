//! Bundle coordinator: classifies entries, runs the operation groups in
//! order and settles the bundle as committed, rolled back or (in batch mode)
//! as a list of independent outcomes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use cdwfhir_storage::MapperRegistry;
use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::classifier::{ExecutionPlan, classify};
use crate::compensation::CompensationLog;
use crate::config::ProcessorConfig;
use crate::entry::{Bundle, BundleEntry, BundleMode, EntryOutcome, Operation};
use crate::error::{BundleError, Fault};
use crate::resolver::ResolvedReferenceCache;
use crate::response::BundleResponse;

/// Executes transaction and batch bundles against a [`MapperRegistry`].
///
/// The processor holds no per-bundle state; one instance can serve any
/// number of bundles.
#[derive(Debug, Clone)]
pub struct BundleProcessor {
    registry: Arc<MapperRegistry>,
    config: ProcessorConfig,
}

impl BundleProcessor {
    /// Creates a processor with the default configuration.
    pub fn new(registry: Arc<MapperRegistry>) -> Self {
        Self {
            registry,
            config: ProcessorConfig::default(),
        }
    }

    /// Creates a processor, validating `config` first.
    pub fn with_config(
        registry: Arc<MapperRegistry>,
        config: ProcessorConfig,
    ) -> Result<Self, BundleError> {
        let config = config.normalized().map_err(BundleError::Config)?;
        Ok(Self { registry, config })
    }

    pub fn registry(&self) -> &Arc<MapperRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Classifies the bundle's entries without executing anything.
    pub fn plan(&self, bundle: &Bundle) -> ExecutionPlan {
        classify(
            &bundle.entries,
            &self.registry,
            self.config.base_url.as_deref(),
        )
    }

    /// Processes a bundle.
    ///
    /// # Errors
    ///
    /// - [`BundleError::MissingMode`] if the bundle has no mode
    /// - [`BundleError::ValidationFailed`] if a transaction entry is malformed
    ///   (nothing was executed)
    /// - [`BundleError::TransactionFailed`] if a transaction entry failed
    ///   (every change was compensated, best effort)
    ///
    /// Batch bundles never fail as a whole once they have a mode.
    pub async fn process(&self, bundle: Bundle) -> Result<BundleResponse, BundleError> {
        let mode = bundle.mode.ok_or(BundleError::MissingMode)?;
        let span = info_span!("bundle", mode = %mode, entries = bundle.entries.len());
        self.run(mode, bundle.entries).instrument(span).await
    }

    /// Processes a FHIR JSON `Bundle` and returns the response bundle.
    pub async fn process_json(&self, document: &Value) -> Result<Value, BundleError> {
        let bundle = Bundle::from_json(document)?;
        Ok(self.process(bundle).await?.to_json())
    }

    async fn run(
        &self,
        mode: BundleMode,
        entries: Vec<BundleEntry>,
    ) -> Result<BundleResponse, BundleError> {
        let started = Instant::now();
        info!("Processing bundle");

        let plan = classify(&entries, &self.registry, self.config.base_url.as_deref());
        if mode.is_transaction() {
            if let Some((index, fault)) = plan.rejected().next() {
                warn!(index, error = %fault, "Transaction rejected before execution");
                return Err(BundleError::ValidationFailed {
                    index,
                    fault: fault.clone(),
                });
            }
        }

        let mut run = BundleRun::new(self, mode, entries, plan, started);
        run.settle_unexecutable();

        for operation in Operation::EXECUTION_ORDER {
            if let Err(fault) = run.execute_group(operation).await {
                debug!(%operation, error = %fault, "Group halted");
                break;
            }
        }

        if mode.is_transaction() {
            if let Some((index, fault)) = run.first_failure.take() {
                let rollback = run.compensation.rollback(&self.registry).await;
                error!(
                    index,
                    error = %fault,
                    deleted = rollback.deleted,
                    restored = rollback.restored,
                    rollback_failures = rollback.failures.len(),
                    "Transaction rolled back"
                );
                return Err(BundleError::TransactionFailed {
                    index,
                    fault,
                    rollback,
                });
            }
            run.compensation.commit();
        }

        let response = BundleResponse::from_entries(mode, run.entries);
        info!(
            succeeded = response.success_count(),
            failed = response.failure_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bundle processed"
        );
        Ok(response)
    }
}

/// State of one bundle while it is being processed.
pub(crate) struct BundleRun<'a> {
    pub(crate) registry: &'a MapperRegistry,
    pub(crate) config: &'a ProcessorConfig,
    pub(crate) mode: BundleMode,
    pub(crate) plan: ExecutionPlan,
    pub(crate) entries: Vec<BundleEntry>,
    /// `fullUrl` to entry index.
    pub(crate) local_ids: HashMap<String, usize>,
    pub(crate) resolved: ResolvedReferenceCache,
    /// Entries whose executor is currently on the stack.
    pub(crate) in_flight: HashSet<usize>,
    pub(crate) faults: HashMap<usize, Fault>,
    pub(crate) first_failure: Option<(usize, Fault)>,
    pub(crate) depth: usize,
    pub(crate) compensation: CompensationLog,
    deadline: Option<Instant>,
}

impl<'a> BundleRun<'a> {
    fn new(
        processor: &'a BundleProcessor,
        mode: BundleMode,
        entries: Vec<BundleEntry>,
        plan: ExecutionPlan,
        started: Instant,
    ) -> Self {
        let mut local_ids = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            if let Some(full_url) = &entry.full_url {
                local_ids.entry(full_url.clone()).or_insert(index);
            }
        }
        let compensation = match mode {
            BundleMode::Transaction => CompensationLog::new(),
            BundleMode::Batch => CompensationLog::disabled(),
        };

        Self {
            registry: &processor.registry,
            config: &processor.config,
            mode,
            plan,
            entries,
            local_ids,
            resolved: ResolvedReferenceCache::new(),
            in_flight: HashSet::new(),
            faults: HashMap::new(),
            first_failure: None,
            depth: 0,
            compensation,
            deadline: processor.config.timeout().map(|timeout| started + timeout),
        }
    }

    pub(crate) fn base_url(&self) -> Option<&'a str> {
        self.config.base_url.as_deref()
    }

    pub(crate) fn check_deadline(&self) -> Result<(), Fault> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Fault::timeout()),
            _ => Ok(()),
        }
    }

    /// Gives rejected and unsupported entries their outcome up front.
    fn settle_unexecutable(&mut self) {
        let mut settled: Vec<(usize, Fault)> = self
            .plan
            .rejected()
            .map(|(index, fault)| (index, fault.clone()))
            .collect();
        settled.extend(
            self.plan
                .unsupported()
                .map(|(index, resource_type)| (index, Fault::unsupported_type(resource_type))),
        );

        for (index, fault) in settled {
            debug!(index, status = %fault.status(), error = %fault.message, "Entry not executable");
            self.entries[index].outcome =
                Some(EntryOutcome::failure(fault.status(), fault.message.clone()));
            self.faults.insert(index, fault);
        }
    }

    /// Runs every not-yet-settled entry of one group, in bundle order.
    ///
    /// In transaction mode the first failure stops the group.
    async fn execute_group(&mut self, operation: Operation) -> Result<(), Fault> {
        let group = self.plan.group(operation);
        if group.is_empty() {
            return Ok(());
        }
        debug!(%operation, entries = group.len(), "Executing group");

        for index in group {
            if self.entries[index].outcome.is_some() {
                continue;
            }
            if let Err(fault) = self.execute_entry(index).await {
                if self.mode.is_transaction() && fault.aborts_transaction() {
                    return Err(fault);
                }
            }
        }
        Ok(())
    }
}
