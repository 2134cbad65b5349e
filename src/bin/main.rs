//! Runs one aggregation against an ontology service and prints the result as JSON.
//!
//! ```bash
//! ontology-aggregate Employee \
//!   --metadata ontology.json \
//!   --group-by department \
//!   --metric count --metric avg:salary
//! ```

use clap::Parser;
use ontology_sdk::{AggregationOperation, ClientSettings, OntologyClient, OntologyDefinition};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct CliArgs {
    /// Object type to aggregate
    object_type: String,

    /// Generated ontology metadata (JSON)
    #[arg(long, env = "ONTOLOGY_METADATA")]
    metadata: Option<PathBuf>,

    /// Exact-bucket grouping property; repeat for nested groups
    #[arg(long = "group-by", value_name = "PROPERTY")]
    group_by: Vec<String>,

    /// `count` or `<operation>:<property>`, e.g. `sum:salary`
    #[arg(long = "metric", value_name = "METRIC")]
    metrics: Vec<String>,

    /// Service-side `where` clause as JSON
    #[arg(long = "where", value_name = "JSON")]
    where_clause: Option<String>,
}

fn parse_metric(
    metric: &str,
) -> Result<(String, AggregationOperation), Box<dyn std::error::Error>> {
    let descriptor = match metric.split_once(':') {
        Some((operation, property)) => {
            json!({ "operation": operation, "propertyApiName": property })
        }
        None => json!({ "operation": metric }),
    };
    Ok((metric.replace(':', "_"), AggregationOperation::from_json(&descriptor)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    let settings = ClientSettings::new()?;

    let metadata_path = args
        .metadata
        .or_else(|| settings.ontology.metadata_path.clone())
        .ok_or("no ontology metadata given; pass --metadata or set ontology.metadata_path")?;
    let ontology = OntologyDefinition::from_path(&metadata_path)?;
    let client = OntologyClient::from_settings(&settings, ontology)?;

    let mut objects = client.objects(&args.object_type)?;
    if let Some(raw) = &args.where_clause {
        objects = objects.filter(serde_json::from_str::<Value>(raw)?);
    }

    let mut step = objects.aggregation()?;
    for property in &args.group_by {
        step = step.group_by(|p| Ok(p.get(property)?.exact()))?;
    }

    let metrics = args
        .metrics
        .iter()
        .map(|metric| parse_metric(metric))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let compute = if metrics.is_empty() {
        step.count()
    } else {
        step.aggregate(|_| Ok(metrics))?
    };

    info!(object_type = %args.object_type, url = %settings.service.url, "running aggregation");
    let result = compute.compute().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
