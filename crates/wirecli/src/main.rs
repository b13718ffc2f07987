// crates/wirecli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use wirecore::{BranchAware, FieldKey, VIRTUAL_CONTEXT_NODE};
use wireengine::{Editor, EngineConfig};

#[derive(Parser)]
#[command(name = "wire")]
#[command(about = "Workflow graph inspection CLI", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration JSON file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a saved workflow document
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Show runnability, branches and references of every node
    Inspect {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Print the evaluation reachable set between two nodes
    Reach {
        /// Path to workflow JSON file
        file: PathBuf,

        #[arg(long)]
        start: Uuid,

        #[arg(long)]
        end: Uuid,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { file } => validate_workflow(&file, config),
        Commands::Inspect { file } => inspect_workflow(&file, config),
        Commands::Reach { file, start, end } => print_reachable(&file, config, start, end),
        Commands::Nodes => {
            list_nodes(&Editor::with_config(config));
            Ok(())
        }
        Commands::Init { output } => create_example_workflow(&output, config),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn open(file: &Path, config: EngineConfig) -> Result<Editor> {
    Editor::open(file, config).with_context(|| format!("loading {}", file.display()))
}

fn validate_workflow(file: &Path, config: EngineConfig) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());
    let editor = open(file, config)?;

    let violations = editor.validation_report()?;
    if violations.is_empty() {
        println!("✅ Workflow is valid:");
        println!("   Name: {}", editor.config().document_name);
        println!("   Nodes: {}", editor.store().node_count());
        println!("   Edges: {}", editor.store().edge_count());
        return Ok(());
    }

    println!("❌ {} violation(s):", violations.len());
    for violation in &violations {
        println!("   • {}", violation);
    }
    bail!("workflow {} is invalid", file.display())
}

fn inspect_workflow(file: &Path, config: EngineConfig) -> Result<()> {
    let editor = open(file, config)?;
    println!("📋 Workflow: {}", editor.config().document_name);
    if let Some(overlay) = editor.overlay() {
        println!("   Evaluating {} -> {}", overlay.start, overlay.end);
    }
    println!();

    for node in editor.store().nodes() {
        let label = node.name.as_deref().unwrap_or(&node.node_type);
        let status = match (node.runnable(), node.disabled()) {
            (true, _) => "runnable",
            (false, true) => "disabled",
            (false, false) => "not runnable",
        };
        println!("  • {} [{}] {} ({})", label, node.kind, node.id, status);
        let upstream: Vec<String> = editor
            .predecessors_of(node.id)?
            .iter()
            .map(|id| match editor.node(*id) {
                Some(n) => n.name.clone().unwrap_or_else(|| n.node_type.clone()),
                None => "context".to_string(),
            })
            .collect();
        println!("    predecessors: {}", upstream.join(", "));

        for branch in node.branches() {
            let tag = if branch.is_else { "else" } else { "branch" };
            println!("    ↳ {} {} runnable: {}", tag, branch.id, branch.runnable);
        }
        for reference in node.references() {
            let enabled = editor
                .observer(reference.observer)
                .map(|o| o.is_enabled())
                .unwrap_or(false);
            println!(
                "    ⇠ {} = {} (enabled: {})",
                reference.slot,
                describe_target(&editor, &reference.target),
                enabled
            );
        }
    }
    Ok(())
}

fn describe_target(editor: &Editor, target: &FieldKey) -> String {
    if target.node_id == VIRTUAL_CONTEXT_NODE {
        return format!("context.{}", target.field);
    }
    match editor.node(target.node_id).and_then(|n| n.name.clone()) {
        Some(name) => format!("{}.{}", name, target.field),
        None => target.to_string(),
    }
}

fn print_reachable(file: &Path, config: EngineConfig, start: Uuid, end: Uuid) -> Result<()> {
    let mut editor = open(file, config)?;
    let reachable = editor.enter_evaluation(start, end)?;
    println!("{}", serde_json::to_string_pretty(reachable)?);
    Ok(())
}

fn list_nodes(editor: &Editor) {
    println!("📦 Available Node Types:");
    println!();

    for descriptor in editor.catalog().descriptors() {
        println!("  • {} ({}, {})", descriptor.node_type, descriptor.kind, descriptor.category);
        if !descriptor.description.is_empty() {
            println!("    {}", descriptor.description);
        }
        for output in &descriptor.outputs {
            println!("      → {}: {}", output.field, output.value_type);
        }
    }
}

fn add_named(editor: &mut Editor, node_type: &str, name: &str, x: f32) -> Result<Uuid> {
    let node = editor
        .catalog()
        .get(node_type)?
        .instantiate()
        .with_name(name)
        .with_position(x, 100.0);
    Ok(editor.add_node(node)?)
}

fn create_example_workflow(output: &Path, config: EngineConfig) -> Result<()> {
    let mut editor = Editor::with_config(config);

    let start = add_named(&mut editor, "start", "Question", 100.0)?;
    let retrieve = add_named(&mut editor, "retrieval", "Find Documents", 300.0)?;
    let answer = add_named(&mut editor, "llm.call", "Answer", 500.0)?;
    let end = add_named(&mut editor, "end", "Reply", 700.0)?;

    editor.connect(start, "out", retrieve, "in", None)?;
    editor.connect(retrieve, "out", answer, "in", None)?;
    editor.connect(answer, "out", end, "in", None)?;
    editor.set_config(answer, "prompt", "Answer using the retrieved documents.")?;

    editor.declare_reference(retrieve, "query", FieldKey::new(start, "input"), None)?;
    editor.declare_reference(answer, "question", FieldKey::new(start, "input"), None)?;
    editor.declare_reference(answer, "context", FieldKey::new(retrieve, "output"), None)?;
    editor.declare_reference(end, "answer", FieldKey::new(answer, "output"), None)?;

    let document = editor.save()?;
    std::fs::write(output, document.to_json_pretty()?)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Inspect it with:");
    println!("  wire inspect {}", output.display());

    Ok(())
}
