use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use graphcore::fingerprint::fingerprint_graph;
use graphcore::typing::TypeResolver;
use graphcore::{
    Catalog, ExecutionEvent, FlowDocument, FlowError, Graph, Node, NodeConfig, NodeEvent, Value,
};
use graphruntime::{CapabilityRegistry, CatalogSource, FlowOutput, FlowRun, FlowRuntime};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graph")]
#[command(about = "Flow graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow document
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object, merged over the document's inputData
        #[arg(short, long)]
        input: Option<String>,

        /// Extra catalog JSON whose entries take priority over the built-ins
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Show debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check a flow document without running it
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Print the content fingerprint of every node
    Fingerprint {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            input,
            catalog,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(&file, input.as_deref(), catalog.as_deref()).await?;
        }

        Commands::Validate { file } => {
            validate_flow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Fingerprint { file } => {
            print_fingerprints(&file)?;
        }

        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn load_document(file: &Path) -> Result<FlowDocument> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_str(&json).with_context(|| format!("{} is not a flow document", file.display()))
}

fn builtin_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    graphnodes::register_all(&mut registry);
    registry
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

async fn run_flow(file: &Path, input: Option<&str>, catalog: Option<&Path>) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let mut document = load_document(file)?;
    println!("📋 Flow: {}", document.name);
    println!("   Nodes: {}", document.nodes.len());
    println!("   Edges: {}", document.edges.len());
    println!();

    if let Some(input) = input {
        match serde_json::from_str::<Value>(input)? {
            Value::Object(values) => document.input_data.extend(values),
            _ => bail!("Input must be a JSON object"),
        }
    }

    let mut registry = builtin_registry();
    if let Some(path) = catalog {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let extra = Catalog::from_json(&json)?;
        println!("📦 Loaded {} node types from {}", extra.len(), path.display());
        registry.register_override(CatalogSource::new(path.display().to_string(), extra));
    }

    tracing::debug!(node_types = registry.node_types().len(), "registry ready");

    let runtime = FlowRuntime::new(registry, graphnodes::default_adapters());
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { node_count, .. } => {
                    println!("▶️  Run started ({} nodes)", node_count);
                }
                ExecutionEvent::NodeStarted {
                    node_id, node_type, ..
                } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted {
                    node_id,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeSkipped {
                    node_id, reason, ..
                } => {
                    println!("  ⏭️  Node {} skipped: {:?}", node_id, reason);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Data { handle, value } => {
                        println!("     📎 [{}] {} = {}", node_id, handle, render(&value));
                    }
                },
                ExecutionEvent::RunCompleted {
                    status,
                    duration_ms,
                    ..
                } => {
                    println!("✨ Run finished ({:?}) in {}ms", status, duration_ms);
                }
                ExecutionEvent::PropagationCompleted { .. } => {}
            }
        }
    });

    let result = runtime.run_document(document).await;

    // let the listener drain before printing the summary
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    let run = match result {
        Ok(run) => run,
        Err(FlowError::MissingRequiredInputs { missing }) => {
            eprintln!();
            eprintln!("Missing required inputs:");
            for name in &missing {
                eprintln!("   • {}", name);
            }
            if let Some(first) = missing.first() {
                eprintln!("Provide them with --input '{{\"{}\": ...}}'", first);
            }
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    print_summary(&run);
    Ok(())
}

fn print_summary(run: &FlowRun) {
    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", run.run_id);
    println!("   Status: {:?}", run.status);
    println!("   Executed: {}", run.executed_node_ids.join(", "));
    for (node_id, reason) in &run.skipped {
        println!("   Skipped {}: {:?}", node_id, reason);
    }
    for failure in &run.failures {
        println!("   Failed {}: {}", failure.node_id, failure.message);
    }

    let outputs: Vec<_> = match &run.output {
        Some(FlowOutput::Single(id, output)) => vec![(id, output)],
        Some(FlowOutput::Multiple(outputs)) => outputs.iter().map(|(id, o)| (id, o)).collect(),
        None => Vec::new(),
    };
    if !outputs.is_empty() {
        println!();
        println!("📤 Output:");
        for (node_id, output) in outputs {
            println!("   Node {}:", node_id);
            for (handle, value) in &output.outputs {
                println!("     {}: {}", handle, render(value));
            }
        }
    }

    if !run.global_variables.is_empty() {
        println!();
        println!("🧮 Variables:");
        for (name, value) in &run.global_variables {
            println!("   {} = {}", name, render(value));
        }
    }
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let document = load_document(file)?;
    let graph = Graph::from_document(&document)?;
    let order = graph.execution_order()?;

    let registry = builtin_registry();
    let catalog = registry.catalog();
    let unknown: Vec<&Node> = graph
        .nodes()
        .iter()
        .filter(|node| !catalog.contains(&node.node_type))
        .collect();
    for node in &unknown {
        println!("   ❌ Node {} has unknown type '{}'", node.id, node.node_type);
    }
    if !unknown.is_empty() {
        bail!("{} node(s) with unknown types", unknown.len());
    }

    let resolver = TypeResolver::new(&graph, &document.node_config_by_node_id, &catalog);
    for issue in resolver.validate_connections() {
        println!("   ⚠️  {}", issue);
    }

    println!("✅ Flow is valid:");
    println!("   Name: {}", document.name);
    println!("   Nodes: {}", document.nodes.len());
    println!("   Edges: {}", document.edges.len());
    println!("   Order: {}", order.join(" → "));

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = builtin_registry();
    for node_type in registry.node_types() {
        if let Some(definition) = registry.get_definition(&node_type) {
            println!("  • {} ({:?})", node_type, definition.category);
            if !definition.description.is_empty() {
                println!("    {}", definition.description);
            }
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn print_fingerprints(file: &Path) -> Result<()> {
    let document = load_document(file)?;
    let graph = Graph::from_document(&document)?;
    let catalog = builtin_registry().catalog();

    let fingerprints = fingerprint_graph(
        &graph,
        &document.node_config_by_node_id,
        &catalog,
        &document.input_data,
    )?;
    for node_id in graph.execution_order()? {
        if let Some(print) = fingerprints.get(node_id) {
            println!("{}  {}", print, node_id);
        }
    }
    Ok(())
}

fn config(pairs: &[(&str, Value)]) -> NodeConfig {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn create_example_flow(output: &Path) -> Result<()> {
    let mut document = FlowDocument::new("Example Threshold Flow");
    document.description = Some("Counts a parameter against a threshold and records the verdict".into());

    document.add_node(
        Node::new("amount", "input").with_position(100.0, 100.0),
        config(&[
            ("name", Value::from("amount")),
            ("valueType", Value::from("number")),
            ("required", Value::Bool(true)),
        ]),
    );
    document.add_node(
        Node::new("check", "conditional").with_position(300.0, 100.0),
        config(&[("operator", Value::from(">")), ("compareTo", Value::from(10))]),
    );
    document.add_node(
        Node::new("high", "variable").with_position(500.0, 50.0),
        config(&[
            ("name", Value::from("verdict")),
            ("operation", Value::from("set")),
            ("value", Value::from("high")),
        ]),
    );
    document.add_node(
        Node::new("low", "variable").with_position(500.0, 150.0),
        config(&[
            ("name", Value::from("verdict")),
            ("operation", Value::from("set")),
            ("value", Value::from("low")),
        ]),
    );

    document.connect("amount", "value", "check", "value");
    document.connect_execution("check", "exec-out-true", "high", "exec-in");
    document.connect_execution("check", "exec-out-false", "low", "exec-in");

    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  graph run --file {} --input '{{\"amount\": 42}}'", output.display());

    Ok(())
}
