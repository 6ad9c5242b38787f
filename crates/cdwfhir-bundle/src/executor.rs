//! Entry executors: one per operation group.
//!
//! Each executor returns the stable `Type/id` its entry now stands for.
//! [`BundleRun::execute_entry`] wraps them with the bookkeeping shared by all
//! verbs: in-flight tracking, outcome recording and caching of the stable id
//! under the entry's `fullUrl`.

use cdwfhir_core::FhirReference;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classifier::{EntryPlan, target_of};
use crate::coordinator::BundleRun;
use crate::entry::{EntryOutcome, Operation, OutcomeStatus};
use crate::error::Fault;

/// Result of a successful executor.
struct Executed {
    outcome: EntryOutcome,
    stable: String,
}

impl Executed {
    fn new(status: OutcomeStatus, target: &FhirReference, with_location: bool) -> Self {
        let stable = target.to_relative();
        Self {
            outcome: EntryOutcome::success(status, with_location.then(|| stable.clone())),
            stable,
        }
    }
}

impl BundleRun<'_> {
    /// Executes one entry and records its outcome.
    ///
    /// Boxed because reference resolution may execute other entries from
    /// inside an executor.
    pub(crate) fn execute_entry(&mut self, index: usize) -> BoxFuture<'_, Result<String, Fault>> {
        Box::pin(async move {
            self.in_flight.insert(index);
            let result = self.dispatch(index).await;
            self.in_flight.remove(&index);
            self.record(index, result)
        })
    }

    async fn dispatch(&mut self, index: usize) -> Result<Executed, Fault> {
        self.check_deadline()?;
        let operation = match self.plan.entries.get(index) {
            Some(EntryPlan::Execute { operation }) => *operation,
            Some(EntryPlan::Unsupported { resource_type }) => {
                return Err(Fault::unsupported_type(resource_type));
            }
            Some(EntryPlan::Rejected { fault }) => return Err(fault.clone()),
            Some(EntryPlan::AlreadyResolved) | None => {
                return Err(Fault::validation(format!("entry {index} is not executable")));
            }
        };
        match operation {
            Operation::Delete => self.execute_delete(index).await,
            Operation::Create => self.execute_create(index).await,
            Operation::Update => self.execute_update(index).await,
            Operation::Read => self.execute_read(index).await,
        }
    }

    fn record(&mut self, index: usize, result: Result<Executed, Fault>) -> Result<String, Fault> {
        match result {
            Ok(Executed { outcome, stable }) => {
                debug!(index, status = %outcome.status, stable = %stable, "Entry executed");
                // A deleted resource is not a valid reference target.
                if self.plan.operation(index) != Some(Operation::Delete) {
                    if let Some(full_url) = &self.entries[index].full_url {
                        self.resolved.insert(full_url.clone(), stable.clone());
                    }
                }
                self.entries[index].outcome = Some(outcome);
                Ok(stable)
            }
            Err(fault) => {
                warn!(index, kind = %fault.kind, error = %fault.message, "Entry failed");
                self.entries[index].outcome =
                    Some(EntryOutcome::failure(fault.status(), fault.message.clone()));
                self.faults.insert(index, fault.clone());
                if self.first_failure.is_none() && fault.aborts_transaction() {
                    self.first_failure = Some((index, fault.clone()));
                }
                Err(fault)
            }
        }
    }

    fn ensure_supported(&self, resource_type: &str) -> Result<(), Fault> {
        if self.registry.supports(resource_type) {
            Ok(())
        } else {
            Err(Fault::unsupported_type(resource_type))
        }
    }

    /// Reads the current content of `target`; absence is a not-found fault.
    async fn fetch_existing(&self, target: &FhirReference) -> Result<Value, Fault> {
        self.registry
            .read(&target.resource_type, &target.id)
            .await
            .map_err(|e| Fault::from(e).context(format!("failed to read {target}")))
    }

    async fn execute_delete(&mut self, index: usize) -> Result<Executed, Fault> {
        let target = target_of(&self.entries[index], Operation::Delete, self.base_url())?;
        self.ensure_supported(&target.resource_type)?;

        let snapshot = self.fetch_existing(&target).await?;
        self.registry
            .delete(&target.resource_type, &target.id)
            .await
            .map_err(|e| Fault::from(e).context(format!("failed to delete {target}")))?;
        self.compensation
            .record_restorable(&target.resource_type, &target.id, snapshot);

        Ok(Executed::new(OutcomeStatus::Deleted, &target, false))
    }

    async fn execute_create(&mut self, index: usize) -> Result<Executed, Fault> {
        let entry = &self.entries[index];
        let resource_type = entry
            .declared_type(self.base_url())
            .ok_or_else(|| Fault::validation("cannot determine the resource type to create"))?;
        let mut resource = entry
            .resource
            .clone()
            .ok_or_else(|| Fault::validation("create requires a resource"))?;
        self.ensure_supported(&resource_type)?;

        self.resolve_references(&resource_type, &mut resource).await?;
        let id = self
            .registry
            .write(&resource_type, &resource, None)
            .await
            .map_err(|e| Fault::from(e).context(format!("failed to create {resource_type}")))?;
        self.compensation.record_created(&resource_type, &id);

        let target = FhirReference::new(resource_type, id);
        set_identity(&mut resource, &target);
        self.entries[index].resource = Some(resource);
        Ok(Executed::new(OutcomeStatus::Created, &target, true))
    }

    async fn execute_update(&mut self, index: usize) -> Result<Executed, Fault> {
        let entry = &self.entries[index];
        let target = target_of(entry, Operation::Update, self.base_url())?;
        let mut resource = entry
            .resource
            .clone()
            .ok_or_else(|| Fault::validation("update requires a resource"))?;
        self.ensure_supported(&target.resource_type)?;

        let existing = self.fetch_existing(&target).await?;
        self.compensation
            .record_restorable(&target.resource_type, &target.id, existing);

        self.resolve_references(&target.resource_type, &mut resource)
            .await?;
        set_identity(&mut resource, &target);
        self.registry
            .write(&target.resource_type, &resource, Some(&target.id))
            .await
            .map_err(|e| Fault::from(e).context(format!("failed to update {target}")))?;

        self.entries[index].resource = Some(resource);
        Ok(Executed::new(OutcomeStatus::Updated, &target, true))
    }

    async fn execute_read(&mut self, index: usize) -> Result<Executed, Fault> {
        let target = target_of(&self.entries[index], Operation::Read, self.base_url())?;
        self.ensure_supported(&target.resource_type)?;

        let resource = self.fetch_existing(&target).await?;
        self.entries[index].resource = Some(resource);
        Ok(Executed::new(OutcomeStatus::ReadOk, &target, false))
    }
}

fn set_identity(resource: &mut Value, target: &FhirReference) {
    if let Some(fields) = resource.as_object_mut() {
        fields.insert(
            "resourceType".to_string(),
            Value::String(target.resource_type.clone()),
        );
        fields.insert("id".to_string(), Value::String(target.id.clone()));
    }
}
