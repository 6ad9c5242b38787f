use std::sync::Arc;

use anyhow::Result;
use cdwfhir_bundle::{Bundle, BundleProcessor};
use cdwfhir_db_memory::InMemoryStore;
use colored::Colorize;
use tracing::info;

use super::read_json;
use crate::cli::{OutputFormat, ProcessArgs};
use crate::config::AppConfig;
use crate::output::{print_json, print_response, print_store, print_success, print_warning};
use crate::warehouse::{build_registry, seed_resources};

pub async fn process(config: &AppConfig, args: &ProcessArgs, format: OutputFormat) -> Result<()> {
    let store = InMemoryStore::new_shared();
    let registry = build_registry(&store, &config.store);

    for path in &args.seed {
        let resources = seed_resources(read_json(Some(path))?)?;
        let keys = store.seed(&resources).await?;
        info!(file = %path.display(), resources = keys.len(), "Seeded store");
        print_success(&format!(
            "Seeded {} resources from {}",
            keys.len(),
            path.display().to_string().cyan()
        ));
    }

    let document = read_json(args.bundle.as_deref())?;
    let processor = BundleProcessor::with_config(Arc::new(registry), config.processor.clone())?;
    let result = match Bundle::from_json(&document) {
        Ok(bundle) => processor.process(bundle).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            print_response(&response, format)?;
            if response.all_succeeded() {
                print_success(&format!("{} entries processed", response.len()));
            } else {
                print_warning(&format!(
                    "{} of {} entries failed",
                    response.failure_count(),
                    response.len()
                ));
            }
            if args.dump_store {
                print_store(&store.snapshot(), format)?;
            }
            Ok(())
        }
        Err(err) => {
            print_json(&err.to_operation_outcome())?;
            if args.dump_store {
                print_store(&store.snapshot(), format)?;
            }
            Err(err.into())
        }
    }
}
