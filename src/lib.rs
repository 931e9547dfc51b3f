//! Annoport: the annotation export pipeline.
//!
//! Annoport translates a platform's internal annotation records into
//! standard interchange formats: COCO, YOLO, Pascal VOC, CoNLL-2003,
//! CoNLL-U, per-label mask PNGs, ELAN EAF and Praat TextGrid. An upstream
//! loader assembles an [`ExportContext`]; the [`ExporterRegistry`]
//! dispatches it to one of the format exporters and hands back an
//! [`ExportResult`].
//!
//! # Modules
//!
//! - [`model`]: Value types (`ExportContext`, `AnnotationRecord`, `ExportResult`, ...)
//! - [`cv`]: Bounding-box math, polygon area, RLE mask codecs
//! - [`text`]: Tokenizer, span-to-BIO alignment, sentence grouping
//! - [`export`]: The exporter contract, registry and format exporters
//! - [`error`]: Error types for annoport operations

pub mod cv;
pub mod error;
pub mod export;
pub mod model;
pub mod text;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use error::ExportError;
pub use export::{ExportFormat, Exporter, ExporterRegistry};
pub use model::{ExportContext, ExportOptions, ExportResult};

/// The annoport CLI application.
#[derive(Parser)]
#[command(name = "annoport")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Export an annotation context to a target format.
    Export(ExportArgs),

    /// List the supported export formats.
    Formats,
}

/// Arguments for the export subcommand.
#[derive(clap::Args)]
struct ExportArgs {
    /// Export context JSON, as assembled by the platform's loader.
    context: PathBuf,

    /// Target format name (see 'annoport formats').
    #[arg(long)]
    format: String,

    /// Output file or directory. Defaults to the context's output_dir.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Format-specific option as key=value. May be repeated.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

/// Run the annoport CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), ExportError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Export(args)) => run_export(args),
        Some(Commands::Formats) => {
            let registry = ExporterRegistry::with_builtins();
            print!("{}", registry.list_exporters());
            Ok(())
        }
        None => {
            println!("annoport {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("The annotation export pipeline.");
            println!();
            println!("Run 'annoport --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the export subcommand.
fn run_export(args: ExportArgs) -> Result<(), ExportError> {
    let data = std::fs::read_to_string(&args.context)?;
    let context: ExportContext =
        serde_json::from_str(&data).map_err(|source| ExportError::ContextParse {
            path: args.context.clone(),
            source,
        })?;

    let options = ExportOptions::from_pairs(args.options.iter().map(String::as_str))
        .map_err(ExportError::InvalidOption)?;

    let output_path = args
        .output
        .unwrap_or_else(|| default_output_path(&args.format, &context));

    let registry = ExporterRegistry::with_builtins();
    let result = registry.export(&args.format, &context, &output_path, &options)?;

    print!("{}", result);

    if result.success {
        Ok(())
    } else {
        Err(ExportError::ExportFailed {
            format_name: result.format_name,
            error_count: result.errors.len(),
        })
    }
}

/// Where an export lands when the caller gives no --output: single-file
/// formats get a file inside the context's output_dir, directory formats
/// get the output_dir itself.
fn default_output_path(format: &str, context: &ExportContext) -> PathBuf {
    match ExportFormat::from_name(format) {
        Some(ExportFormat::Coco) => context.output_dir.join("annotations.json"),
        Some(ExportFormat::Conll2003) => context.output_dir.join("annotations.conll"),
        Some(ExportFormat::Conllu) => context.output_dir.join("annotations.conllu"),
        _ => context.output_dir.clone(),
    }
}
