/*!
modelstate CLI - inspect checkpoints and handle trained model exports.

Checkpoints are read from local storage; model definitions are exported to
and reassembled from JSON lines of compressed definition documents.
*/

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use modelstate_core::{
    create_engine_from_config, validate_registry, CheckpointConfig, CheckpointEngine,
    ChunkedExporter, ExportConfig, GzipCompressor, LocalFileStorage, ModelDefinition,
    PersistError, StateDocument, StateNode, StorageAdapter,
};
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

type Engine = CheckpointEngine<LocalFileStorage, GzipCompressor>;

#[derive(Parser)]
#[command(name = "modelstate")]
#[command(about = "Inspect state checkpoints and export trained models")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the checkpoints
    #[arg(
        short,
        long,
        global = true,
        env = "MODELSTATE_BASE_PATH",
        default_value = "./checkpoints"
    )]
    base_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored checkpoints
    List {
        /// Only list checkpoints whose path starts with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Show the metadata of a checkpoint
    Inspect {
        /// Checkpoint path relative to the base path
        checkpoint: String,
        /// Also print the state document tree
        #[arg(short, long)]
        tree: bool,
    },
    /// Verify integrity of a checkpoint
    Verify {
        checkpoint: String,
    },
    /// Delete a checkpoint
    Delete {
        checkpoint: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Export a model definition as compressed definition documents (JSON lines)
    Export {
        /// Model definition JSON file
        definition: PathBuf,
        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Upper bound on the encoded text of one document
        #[arg(long)]
        max_document_size: Option<usize>,
        /// Gzip level (0-9)
        #[arg(long, default_value_t = 6)]
        compression_level: u32,
        /// Drop features no split refers to before exporting
        #[arg(long)]
        prune_features: bool,
    },
    /// Rebuild a model definition from exported documents
    Reassemble {
        /// JSON lines file written by `export`
        documents: PathBuf,
        /// Output file (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the structural size report of a model definition
    SizeInfo {
        definition: PathBuf,
    },
}

#[derive(Tabled)]
struct CheckpointInfo {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Job ID")]
    job_id: String,
    #[tabled(rename = "Index")]
    index: u64,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Created")]
    timestamp: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    validate_registry().context("Tag registry is inconsistent")?;

    let mut stdout = io::stdout().lock();
    run(cli, &mut stdout)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli, out: &mut impl Write) -> Result<(), anyhow::Error> {
    let config = CheckpointConfig::default_json().with_base_path(&cli.base_path);

    match cli.command {
        Commands::List { prefix } => {
            list_checkpoints(&create_engine_from_config(&config)?, &prefix, out)
        }
        Commands::Inspect { checkpoint, tree } => {
            inspect_checkpoint(&create_engine_from_config(&config)?, &checkpoint, tree, out)
        }
        Commands::Verify { checkpoint } => {
            verify_checkpoint(&create_engine_from_config(&config)?, &checkpoint, out)
        }
        Commands::Delete { checkpoint, force } => {
            delete_checkpoint(&create_engine_from_config(&config)?, &checkpoint, force, out)
        }
        Commands::Export {
            definition,
            output,
            max_document_size,
            compression_level,
            prune_features,
        } => {
            let export_config = ExportConfig {
                max_document_size: max_document_size.unwrap_or(modelstate_core::MAX_DOCUMENT_SIZE),
                compression_level,
            };
            export_definition(&definition, output.as_deref(), &export_config, prune_features, out)
        }
        Commands::Reassemble { documents, output } => {
            reassemble_definition(&documents, output.as_deref(), out)
        }
        Commands::SizeInfo { definition } => size_info(&definition, out),
    }
}

fn list_checkpoints(engine: &Engine, prefix: &str, out: &mut impl Write) -> Result<(), anyhow::Error> {
    let mut checkpoints = Vec::new();
    for path in engine.list(prefix)? {
        match engine.metadata(&path) {
            Ok(metadata) => checkpoints.push(CheckpointInfo {
                path: path.clone(),
                job_id: metadata.job_id,
                index: metadata.checkpoint_index,
                format: metadata.state_format.name().to_string(),
                timestamp: format_timestamp(metadata.timestamp.timestamp()),
                size: engine
                    .storage()
                    .load(&path)
                    .map(|data| format_size(data.len() as u64))
                    .unwrap_or_else(|_| "Unknown".to_string()),
            }),
            Err(e) => warn!("Skipping {}: {}", path, e),
        }
    }

    if checkpoints.is_empty() {
        writeln!(out, "No checkpoints found")?;
    } else {
        checkpoints.sort_by(|a, b| (&a.job_id, a.index).cmp(&(&b.job_id, b.index)));
        writeln!(out, "{}", Table::new(checkpoints))?;
    }
    Ok(())
}

fn inspect_checkpoint(
    engine: &Engine,
    checkpoint: &str,
    tree: bool,
    out: &mut impl Write,
) -> Result<(), anyhow::Error> {
    info!("Inspecting checkpoint: {}", checkpoint);
    let (metadata, document) = engine.load(checkpoint)?;

    writeln!(out, "Checkpoint Details:")?;
    writeln!(out, "  Path: {checkpoint}")?;
    writeln!(out, "  Job ID: {}", metadata.job_id)?;
    writeln!(out, "  Index: {}", metadata.checkpoint_index)?;
    writeln!(out, "  Checkpoint ID: {}", metadata.checkpoint_id)?;
    writeln!(out, "  Created: {}", format_timestamp(metadata.timestamp.timestamp()))?;
    writeln!(out, "  Format: {} ({:?} tags)", metadata.state_format.name(), metadata.tag_mode)?;
    writeln!(out, "  Compression: {}", metadata.compression_algorithm)?;
    writeln!(out, "  State Size: {}", format_size(metadata.uncompressed_size as u64))?;
    writeln!(out, "  Content Hash: {}", metadata.content_hash)?;
    writeln!(out, "  Nodes: {}", document.node_count())?;
    if let Some(description) = &metadata.description {
        writeln!(out, "  Description: {description}")?;
    }

    if tree {
        write_document_tree(&document, out)?;
    }
    Ok(())
}

fn write_document_tree(document: &StateDocument, out: &mut impl Write) -> io::Result<()> {
    fn write_node(node: &StateNode, depth: usize, out: &mut impl Write) -> io::Result<()> {
        let indent = "  ".repeat(depth);
        match &node.value {
            Some(value) => writeln!(out, "{indent}{} = {value}", node.name),
            None => {
                writeln!(out, "{indent}{}", node.name)?;
                node.children
                    .iter()
                    .try_for_each(|child| write_node(child, depth + 1, out))
            }
        }
    }

    writeln!(out, "{}", document.root_name)?;
    document
        .children
        .iter()
        .try_for_each(|node| write_node(node, 1, out))
}

fn verify_checkpoint(engine: &Engine, checkpoint: &str, out: &mut impl Write) -> Result<(), anyhow::Error> {
    info!("Verifying checkpoint: {}", checkpoint);
    match engine.verify(checkpoint) {
        Ok(()) => {
            writeln!(out, "✓ Checkpoint is valid and integrity check passed")?;
            Ok(())
        }
        Err(PersistError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            Err(anyhow::anyhow!("Integrity check failed"))
        }
        Err(e) => {
            error!("✗ Failed to verify checkpoint: {}", e);
            Err(e.into())
        }
    }
}

fn delete_checkpoint(
    engine: &Engine,
    checkpoint: &str,
    force: bool,
    out: &mut impl Write,
) -> Result<(), anyhow::Error> {
    if !engine.exists(checkpoint) {
        return Err(anyhow::anyhow!("Checkpoint not found: {checkpoint}"));
    }
    if !force {
        print!("Are you sure you want to delete checkpoint '{checkpoint}'? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().to_lowercase().starts_with('y') {
            writeln!(out, "Deletion cancelled")?;
            return Ok(());
        }
    }

    engine.delete(checkpoint)?;
    writeln!(out, "✓ Checkpoint deleted successfully")?;
    Ok(())
}

fn read_definition(path: &Path) -> Result<ModelDefinition, anyhow::Error> {
    let json = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ModelDefinition::from_json_slice(&json)
        .with_context(|| format!("Invalid model definition in {}", path.display()))
}

fn export_definition(
    path: &Path,
    output: Option<&Path>,
    config: &ExportConfig,
    prune_features: bool,
    out: &mut impl Write,
) -> Result<(), anyhow::Error> {
    let mut definition = read_definition(path)?;
    if prune_features {
        let kept = definition.trained_model_mut().remove_unused_features();
        info!("Kept {} feature(s) after pruning", kept.len());
    }

    let exporter = ChunkedExporter::from_config(config)?;
    let summary = match output {
        Some(output) => {
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let mut writer = BufWriter::new(file);
            let summary = exporter.export(&definition, |document| {
                writeln!(writer, "{}", document.to_json_string()?)?;
                Ok(())
            })?;
            writer.flush()?;
            summary
        }
        None => exporter.export(&definition, |document| {
            writeln!(out, "{}", document.to_json_string()?)?;
            Ok(())
        })?,
    };

    info!(
        "Exported {} document(s), {} encoded bytes",
        summary.documents, summary.encoded_bytes
    );
    Ok(())
}

fn reassemble_definition(
    path: &Path,
    output: Option<&Path>,
    out: &mut impl Write,
) -> Result<(), anyhow::Error> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let json = ChunkedExporter::new().reassemble_json_lines(BufReader::new(file))?;

    let definition = ModelDefinition::from_json_slice(&json)
        .context("Reassembled data is not a model definition")?;
    info!(
        "Reassembled model definition with {} feature(s)",
        definition.trained_model().feature_names().len()
    );

    match output {
        Some(output) => std::fs::write(output, &json)
            .with_context(|| format!("Failed to write {}", output.display()))?,
        None => {
            out.write_all(&json)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn size_info(path: &Path, out: &mut impl Write) -> Result<(), anyhow::Error> {
    let definition = read_definition(path)?;
    let size_info = definition.size_info();
    let value: serde_json::Value = serde_json::from_str(&size_info.json_string()?)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    writeln!(out, "Estimated operations: {}", size_info.num_operations())?;
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
