use anyhow::Result;
use cdwfhir_bundle::{BundleResponse, EntryPlan, ExecutionPlan, OutcomeStatus};
use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Status lines go to stderr so stdout stays a clean JSON document.
pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn colored_status(status: OutcomeStatus) -> String {
    let line = status.status_line();
    if status.is_success() {
        line.green().to_string()
    } else if status == OutcomeStatus::InternalError {
        line.red().to_string()
    } else {
        line.yellow().to_string()
    }
}

pub fn print_response(response: &BundleResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&response.to_json()),
        OutputFormat::Table => {
            if response.is_empty() {
                println!("No entries.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["#", "Status", "Location", "Message"]);
            for (index, entry) in response.entries.iter().enumerate() {
                builder.push_record([
                    index.to_string(),
                    colored_status(entry.status),
                    entry.location.clone().unwrap_or_else(|| "-".into()),
                    entry.message.clone().unwrap_or_default(),
                ]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!(
                "{}: {} succeeded, {} failed",
                response.mode.to_string().cyan(),
                response.success_count(),
                response.failure_count()
            );
            Ok(())
        }
    }
}

pub fn print_plan(plan: &ExecutionPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(plan)?),
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["#", "Plan", "Detail"]);
            for (index, entry) in plan.entries.iter().enumerate() {
                let (kind, detail) = match entry {
                    EntryPlan::Execute { operation } => (operation.to_string().green().to_string(), String::new()),
                    EntryPlan::AlreadyResolved => ("settled".to_string(), String::new()),
                    EntryPlan::Unsupported { resource_type } => (
                        "not-implemented".yellow().to_string(),
                        format!("no mapper for {resource_type}"),
                    ),
                    EntryPlan::Rejected { fault } => ("rejected".red().to_string(), fault.message.clone()),
                };
                builder.push_record([index.to_string(), kind, detail]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            Ok(())
        }
    }
}

pub fn print_store(resources: &[Value], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&Value::Array(resources.to_vec())),
        OutputFormat::Table => {
            if resources.is_empty() {
                println!("Store is empty.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["ResourceType", "ID"]);
            for resource in resources {
                let rt = resource
                    .get("resourceType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("-");
                let id = resource.get("id").and_then(|v| v.as_str()).unwrap_or("-");
                builder.push_record([rt, id]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            Ok(())
        }
    }
}
