use std::sync::Arc;

use anyhow::{Result, bail};
use cdwfhir_bundle::{Bundle, BundleProcessor};
use cdwfhir_db_memory::InMemoryStore;

use super::read_json;
use crate::cli::{OutputFormat, ValidateArgs};
use crate::config::AppConfig;
use crate::output::{print_plan, print_success};
use crate::warehouse::build_registry;

pub fn validate(config: &AppConfig, args: &ValidateArgs, format: OutputFormat) -> Result<()> {
    let document = read_json(args.bundle.as_deref())?;
    let bundle = Bundle::from_json(&document)?;
    let Some(mode) = bundle.mode else {
        bail!("Bundle does not declare a mode (transaction or batch)");
    };

    let registry = build_registry(&InMemoryStore::new_shared(), &config.store);
    let processor = BundleProcessor::with_config(Arc::new(registry), config.processor.clone())?;
    let plan = processor.plan(&bundle);
    print_plan(&plan, format)?;

    let rejected = plan.rejected().count();
    if rejected > 0 {
        bail!("{rejected} of {} entries would be rejected", bundle.entries.len());
    }
    print_success(&format!("{mode} bundle with {} entries is valid", bundle.entries.len()));
    Ok(())
}
