//! Reference resolution.
//!
//! Entries refer to each other by `fullUrl` (usually a `urn:uuid:`). Before
//! an entry is written, every reference at one of its type's reference paths
//! is swapped for the stable `Type/id` of its target. When the target entry
//! has not run yet it is executed on the spot, so entries may reference each
//! other regardless of their position or group.

use std::collections::HashMap;

use cdwfhir_core::{is_temporary_id, parse_reference};
use serde_json::Value;
use tracing::{debug, trace};

use crate::coordinator::BundleRun;
use crate::entry::Operation;
use crate::error::{Fault, FaultKind};

/// Bundle-local id to stable `Type/id`, filled as entries succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedReferenceCache {
    resolved: HashMap<String, String>,
}

impl ResolvedReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, local_id: &str) -> Option<&str> {
        self.resolved.get(local_id).map(String::as_str)
    }

    pub fn insert(&mut self, local_id: impl Into<String>, stable: impl Into<String>) {
        self.resolved.insert(local_id.into(), stable.into());
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.resolved.contains_key(local_id)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl BundleRun<'_> {
    /// Resolves one reference string to a stable reference.
    ///
    /// Strings that no entry declares as its `fullUrl` are already stable and
    /// pass through (made relative when they sit under the base URL), except
    /// dangling `urn:uuid:`/`urn:oid:` ids, which are reference faults.
    pub(crate) async fn resolve(&mut self, reference: &str) -> Result<String, Fault> {
        let Some(&target) = self.local_ids.get(reference) else {
            if is_temporary_id(reference) {
                return Err(Fault::new(
                    FaultKind::Reference,
                    format!("no entry in the bundle declares '{reference}'"),
                ));
            }
            return Ok(self.localize(reference));
        };

        if let Some(stable) = self.resolved.get(reference) {
            trace!(reference, stable, "Reference resolved from cache");
            return Ok(stable.to_string());
        }
        self.check_deadline()?;

        if self.in_flight.contains(&target) {
            return Err(Fault::cycle(format!(
                "'{reference}' is already being executed (entry {target})"
            )));
        }
        if self.plan.operation(target) == Some(Operation::Delete) {
            return Err(Fault::validation(format!(
                "'{reference}' names entry {target}, which deletes its resource"
            )));
        }
        if let Some(fault) = self.faults.get(&target) {
            return Err(fault.clone().context(format!("entry {target} failed")));
        }
        if self.entries[target].outcome.is_some() {
            return Err(Fault::validation(format!(
                "entry {target} produced no resource to reference"
            )));
        }
        if self.depth >= self.config.max_reference_depth {
            return Err(Fault::depth_exceeded(self.config.max_reference_depth));
        }

        debug!(reference, target, depth = self.depth + 1, "Executing referenced entry");
        self.depth += 1;
        let result = self.execute_entry(target).await;
        self.depth -= 1;
        result
    }

    /// Absolute references under the configured base URL become relative
    /// `Type/id[/_history/v]`; everything else is returned unchanged.
    fn localize(&self, reference: &str) -> String {
        let Some(base_url) = self.base_url() else {
            return reference.to_string();
        };
        let under_base = reference
            .strip_prefix(base_url)
            .is_some_and(|rest| rest.starts_with('/'));
        if !under_base {
            return reference.to_string();
        }
        match parse_reference(reference, Some(base_url)) {
            Ok(local) => match &local.version {
                Some(version) => format!("{}/_history/{version}", local.to_relative()),
                None => local.to_relative(),
            },
            Err(unresolvable) => {
                trace!(reference, %unresolvable, "Reference left as is");
                reference.to_string()
            }
        }
    }

    /// Rewrites every reference of `resource` to its stable form.
    ///
    /// All references are resolved before any is rewritten, so a failure
    /// leaves the resource untouched. Returns the number of references changed.
    pub(crate) async fn resolve_references(
        &mut self,
        resource_type: &str,
        resource: &mut Value,
    ) -> Result<usize, Fault> {
        let registry = self.registry;
        let paths = registry.reference_paths(resource_type);
        if paths.is_empty() {
            return Ok(0);
        }

        let mut replacements: HashMap<String, String> = HashMap::new();
        for path in paths {
            for reference in path.collect(resource) {
                if replacements.contains_key(&reference) {
                    continue;
                }
                let stable = self
                    .resolve(&reference)
                    .await
                    .map_err(|fault| fault.through_reference(&reference))?;
                replacements.insert(reference, stable);
            }
        }

        let mut rewritten = 0;
        for path in paths {
            rewritten += path.rewrite(resource, &mut |current: &str| {
                replacements
                    .get(current)
                    .filter(|stable| stable.as_str() != current)
                    .cloned()
            });
        }
        Ok(rewritten)
    }
}
