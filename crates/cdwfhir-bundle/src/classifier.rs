//! Entry classification.
//!
//! Every entry is assigned to one of the four operation groups (or rejected)
//! before anything touches the store. This is also the pre-validation pass
//! for transactions: URL shape, verb and resource presence are all checked
//! here, so a malformed transaction is refused without side effects.

use std::collections::HashSet;

use cdwfhir_core::{FhirReference, parse_numeric_id, parse_request_url};
use cdwfhir_storage::MapperRegistry;
use serde::Serialize;

use crate::entry::{BundleEntry, Operation, Verb};
use crate::error::Fault;

/// How one entry will be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "plan", rename_all = "kebab-case")]
pub enum EntryPlan {
    /// Runs in the given group.
    Execute { operation: Operation },
    /// Carried an outcome before processing started; left untouched.
    AlreadyResolved,
    /// No mapper for the type; answered with not-implemented.
    Unsupported { resource_type: String },
    /// Malformed; answered with bad-request (or fails the transaction).
    Rejected { fault: Fault },
}

/// Classification of a whole bundle, indexed like its entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub entries: Vec<EntryPlan>,
}

impl ExecutionPlan {
    /// Entry indices of one group, in bundle order.
    pub fn group(&self, operation: Operation) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, plan)| match plan {
                EntryPlan::Execute { operation: op } if *op == operation => Some(index),
                _ => None,
            })
            .collect()
    }

    /// Rejected entries with their faults, in bundle order.
    pub fn rejected(&self) -> impl Iterator<Item = (usize, &Fault)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, plan)| match plan {
                EntryPlan::Rejected { fault } => Some((index, fault)),
                _ => None,
            })
    }

    /// Entries whose type has no mapper, in bundle order.
    pub fn unsupported(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, plan)| match plan {
                EntryPlan::Unsupported { resource_type } => Some((index, resource_type.as_str())),
                _ => None,
            })
    }

    pub fn operation(&self, index: usize) -> Option<Operation> {
        match self.entries.get(index)? {
            EntryPlan::Execute { operation } => Some(*operation),
            _ => None,
        }
    }
}

/// Classifies all entries of a bundle.
pub fn classify(
    entries: &[BundleEntry],
    registry: &MapperRegistry,
    base_url: Option<&str>,
) -> ExecutionPlan {
    let mut seen_full_urls = HashSet::new();
    let entries = entries
        .iter()
        .map(|entry| {
            if entry.outcome.is_some() {
                return EntryPlan::AlreadyResolved;
            }
            if let Some(full_url) = &entry.full_url {
                if !seen_full_urls.insert(full_url.as_str()) {
                    return EntryPlan::Rejected {
                        fault: Fault::validation(format!(
                            "fullUrl '{full_url}' is declared by more than one entry"
                        )),
                    };
                }
            }
            classify_entry(entry, registry, base_url)
        })
        .collect();
    ExecutionPlan { entries }
}

/// Classifies one entry on its own (no duplicate fullUrl detection).
pub fn classify_entry(
    entry: &BundleEntry,
    registry: &MapperRegistry,
    base_url: Option<&str>,
) -> EntryPlan {
    let operation = match operation_of(entry) {
        Ok(operation) => operation,
        Err(fault) => return EntryPlan::Rejected { fault },
    };

    let Some(resource_type) = entry.declared_type(base_url) else {
        return EntryPlan::Rejected {
            fault: Fault::validation(
                "cannot determine the resource type from the resource or the request url",
            ),
        };
    };
    if !registry.supports(&resource_type) {
        return EntryPlan::Unsupported { resource_type };
    }

    if let Some(fault) = check_shape(entry, operation, base_url).err() {
        return EntryPlan::Rejected { fault };
    }
    EntryPlan::Execute { operation }
}

/// The group an entry's verb puts it in.
///
/// A missing or unimplemented verb on an entry that carries a resource is
/// treated as a create; an unimplemented verb without a resource is invalid.
pub fn operation_of(entry: &BundleEntry) -> Result<Operation, Fault> {
    match &entry.verb {
        Verb::Delete => Ok(Operation::Delete),
        Verb::Create | Verb::Unspecified => Ok(Operation::Create),
        Verb::Update => Ok(Operation::Update),
        Verb::Read => Ok(Operation::Read),
        Verb::Unsupported(_) if entry.resource.is_some() => Ok(Operation::Create),
        Verb::Unsupported(method) => Err(Fault::validation(format!(
            "unsupported method '{method}' on an entry without a resource"
        ))),
    }
}

fn check_shape(entry: &BundleEntry, operation: Operation, base_url: Option<&str>) -> Result<(), Fault> {
    if entry.resource.as_ref().is_some_and(|r| !r.is_object()) {
        return Err(Fault::validation("resource must be a JSON object"));
    }
    if let (Some(declared), Some(url)) = (entry.resource_type(), entry.request_url.as_deref()) {
        if let Some(url_type) = cdwfhir_core::request_url_type(url, base_url) {
            if url_type != declared {
                return Err(Fault::validation(format!(
                    "request url '{url}' names {url_type} but the resource is a {declared}"
                )));
            }
        }
    }
    match operation {
        Operation::Create => {
            if entry.resource.is_none() {
                return Err(Fault::validation("create requires a resource"));
            }
        }
        Operation::Update => {
            if entry.resource.is_none() {
                return Err(Fault::validation("update requires a resource"));
            }
            target_of(entry, operation, base_url)?;
        }
        Operation::Delete | Operation::Read => {
            target_of(entry, operation, base_url)?;
        }
    }
    Ok(())
}

/// The stored resource a delete, update or read entry targets.
///
/// Deletes and updates look at the inline resource's id first, reads at the
/// request URL first. Either way the id must be numeric.
pub(crate) fn target_of(
    entry: &BundleEntry,
    operation: Operation,
    base_url: Option<&str>,
) -> Result<FhirReference, Fault> {
    let from_resource = || {
        let resource_type = entry.resource_type()?;
        let id = entry.resource_id()?;
        Some(
            parse_numeric_id(id)
                .map(|_| FhirReference::new(resource_type, id))
                .map_err(|e| Fault::validation(format!("resource id of {resource_type}: {e}"))),
        )
    };
    let from_url = || {
        entry
            .request_url
            .as_deref()
            .map(|url| parse_request_url(url, base_url).map_err(|e| Fault::validation(e.to_string())))
    };

    let target = match operation {
        Operation::Read => match from_url() {
            Some(parsed) => Some(parsed?),
            None => from_resource().transpose()?,
        },
        _ => match from_resource() {
            Some(target) => Some(target?),
            None => from_url().transpose()?,
        },
    };
    target.ok_or_else(|| {
        Fault::validation(format!(
            "{operation} requires a request url of the form Type/id or a resource with an id"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryOutcome;
    use crate::entry::OutcomeStatus;
    use crate::error::FaultKind;
    use async_trait::async_trait;
    use cdwfhir_storage::{ResourceMapper, StorageError};
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct NullMapper(&'static str);

    #[async_trait]
    impl ResourceMapper for NullMapper {
        fn resource_type(&self) -> &str {
            self.0
        }

        async fn read(&self, id: &str) -> Result<Value, StorageError> {
            Err(StorageError::not_found(self.0, id))
        }

        async fn write(&self, _: &Value, _: Option<&str>) -> Result<String, StorageError> {
            Ok("1".into())
        }

        async fn delete(&self, id: &str) -> Result<String, StorageError> {
            Ok(id.into())
        }
    }

    fn registry() -> MapperRegistry {
        MapperRegistry::new()
            .with_mapper(Arc::new(NullMapper("Patient")))
            .with_mapper(Arc::new(NullMapper("Observation")))
    }

    fn rejected_kind(plan: &EntryPlan) -> Option<FaultKind> {
        match plan {
            EntryPlan::Rejected { fault } => Some(fault.kind),
            _ => None,
        }
    }

    #[test]
    fn groups_preserve_bundle_order() {
        let entries = vec![
            BundleEntry::create(json!({"resourceType": "Patient"})),
            BundleEntry::read("Patient/1"),
            BundleEntry::delete("Observation/3"),
            BundleEntry::create(json!({"resourceType": "Observation"})),
            BundleEntry::update(json!({"resourceType": "Patient", "id": "1"})),
            BundleEntry::delete("Patient/4"),
        ];
        let plan = classify(&entries, &registry(), None);

        assert_eq!(plan.group(Operation::Delete), vec![2, 5]);
        assert_eq!(plan.group(Operation::Create), vec![0, 3]);
        assert_eq!(plan.group(Operation::Update), vec![4]);
        assert_eq!(plan.group(Operation::Read), vec![1]);
        assert_eq!(plan.rejected().count(), 0);
    }

    #[test]
    fn verbs_without_groups_fall_back_to_create() {
        let mut entry = BundleEntry::new(Verb::Unsupported("PATCH".into()))
            .with_resource(json!({"resourceType": "Patient"}));
        assert_eq!(operation_of(&entry), Ok(Operation::Create));

        entry.resource = None;
        entry.request_url = Some("Patient/1".into());
        assert_eq!(
            operation_of(&entry).unwrap_err().kind,
            FaultKind::Validation
        );

        let entry = BundleEntry::new(Verb::Unspecified).with_resource(json!({"resourceType": "Patient"}));
        assert_eq!(operation_of(&entry), Ok(Operation::Create));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        let entries = vec![
            BundleEntry::delete("Patient"),
            BundleEntry::delete("Patient/abc"),
            BundleEntry::read("Patient/1/extra"),
            BundleEntry::new(Verb::Create).with_request_url("Patient"),
            BundleEntry::update(json!({"resourceType": "Patient"})),
            BundleEntry::new(Verb::Read),
            BundleEntry::update(json!({"resourceType": "Patient", "id": "1"}))
                .with_request_url("Observation/1"),
        ];
        let plan = classify(&entries, &registry(), None);
        for (index, entry_plan) in plan.entries.iter().enumerate() {
            assert_eq!(
                rejected_kind(entry_plan),
                Some(FaultKind::Validation),
                "entry {index} should be rejected"
            );
        }
    }

    #[test]
    fn unsupported_types_and_existing_outcomes() {
        let mut resolved = BundleEntry::create(json!({"resourceType": "Patient"}));
        resolved.outcome = Some(EntryOutcome::success(OutcomeStatus::Created, None));
        let entries = vec![
            BundleEntry::create(json!({"resourceType": "Basic"})),
            resolved,
            BundleEntry::delete("Medication/1"),
        ];
        let plan = classify(&entries, &registry(), None);

        assert_eq!(
            plan.unsupported().collect::<Vec<_>>(),
            vec![(0, "Basic"), (2, "Medication")]
        );
        assert_eq!(plan.entries[1], EntryPlan::AlreadyResolved);
        assert_eq!(plan.operation(1), None);
    }

    #[test]
    fn duplicate_full_urls_are_rejected() {
        let entries = vec![
            BundleEntry::create(json!({"resourceType": "Patient"})).with_full_url("urn:uuid:a"),
            BundleEntry::create(json!({"resourceType": "Patient"})).with_full_url("urn:uuid:a"),
        ];
        let plan = classify(&entries, &registry(), None);
        assert_eq!(plan.operation(0), Some(Operation::Create));
        assert_eq!(rejected_kind(&plan.entries[1]), Some(FaultKind::Validation));
    }

    #[test]
    fn targets_follow_verb_preference() {
        let entry = BundleEntry::update(json!({"resourceType": "Patient", "id": "7"}))
            .with_request_url("Patient/8");
        assert_eq!(
            target_of(&entry, Operation::Update, None).unwrap(),
            FhirReference::new("Patient", "7")
        );
        assert_eq!(
            target_of(&entry, Operation::Read, None).unwrap(),
            FhirReference::new("Patient", "8")
        );

        let entry = BundleEntry::delete("http://cdw.example.org/fhir/Patient/3");
        assert_eq!(
            target_of(&entry, Operation::Delete, Some("http://cdw.example.org/fhir")).unwrap(),
            FhirReference::new("Patient", "3")
        );
        assert!(target_of(&entry, Operation::Delete, None).is_err());
    }

    #[test]
    fn resource_ids_must_be_numeric() {
        let entries = vec![
            BundleEntry::update(json!({"resourceType": "Patient", "id": "abc"})),
            BundleEntry::new(Verb::Delete).with_resource(json!({"resourceType": "Patient", "id": "x1"})),
            BundleEntry::update(json!({"resourceType": "Patient", "id": "12"})),
        ];
        let plan = classify(&entries, &registry(), None);

        assert_eq!(rejected_kind(&plan.entries[0]), Some(FaultKind::Validation));
        assert_eq!(rejected_kind(&plan.entries[1]), Some(FaultKind::Validation));
        assert_eq!(plan.operation(2), Some(Operation::Update));
        assert_eq!(
            target_of(&entries[2], Operation::Update, None).unwrap(),
            FhirReference::new("Patient", "12")
        );
    }
}
