// loanlens CLI - process, inspect and mask loan documents
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use loanlens::extraction::provider::RawProviderDocument;
use loanlens::extraction::{DocumentAnalyzer, ExtractionRouter, LinguaIdentifier};
use loanlens::pipeline::{check_file_size, mime_type_for};
use loanlens::{init_tracing, DataMasker, LoanDocumentPipeline, MaskLevel, PipelineConfig};

#[derive(Parser)]
#[command(name = "loanlens")]
#[command(about = "Extract, score and mask loan documents across several analysis providers")]
struct Cli {
    /// Config file (defaults to $LOANLENS_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a document
    Process {
        /// PDF or image to process
        file: PathBuf,
        /// Serve provider responses from <dir>/<provider>.json instead of running commands
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Override the MIME type guessed from the extension
        #[arg(long)]
        mime: Option<String>,
        /// Override the configured mask level
        #[arg(short, long)]
        mask_level: Option<MaskLevel>,
        /// Print the unmasked record
        #[arg(long)]
        full_view: bool,
        /// Write masked and unmasked records into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show characteristics and provider selection for a stored quick scan
    Detect {
        /// Broad-OCR response saved as JSON
        scan: PathBuf,
    },
    /// Mask an existing extraction record
    Mask {
        /// Record saved as JSON
        record: PathBuf,
        #[arg(short, long)]
        mask_level: Option<MaskLevel>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = PipelineConfig::discover(cli.config.as_deref())?;

    match cli.command {
        Commands::Process { file, replay, mime, mask_level, full_view, output } => {
            if let Some(level) = mask_level {
                config.mask_level = level;
            }
            process_document(&config, &file, replay.as_deref(), mime, full_view, output.as_deref()).await?;
        }
        Commands::Detect { scan } => {
            detect(&scan)?;
        }
        Commands::Mask { record, mask_level } => {
            let level = mask_level.unwrap_or(config.mask_level);
            mask_record(&record, level, &config)?;
        }
    }

    Ok(())
}

async fn process_document(
    config: &PipelineConfig,
    file: &Path,
    replay: Option<&Path>,
    mime: Option<String>,
    full_view: bool,
    output: Option<&Path>,
) -> Result<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let size = fs::metadata(file)
        .with_context(|| format!("reading {}", file.display()))?
        .len();
    check_file_size(&name, size, config.max_file_size_mb)?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let mime_type = mime.unwrap_or_else(|| mime_type_for(file).to_string());

    let pipeline = LoanDocumentPipeline::from_config(config, replay)?;
    let processed = pipeline.process(&name, &bytes, &mime_type).await?;

    if let Some(dir) = output {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        write_json(&dir.join(format!("{}.masked.json", stem)), &processed.views.masked)?;
        write_json(&dir.join(format!("{}.full.json", stem)), &processed.views.unmasked)?;
        eprintln!("Wrote both views to {}", dir.display());
    }

    let view = if full_view { &processed.views.unmasked } else { &processed.views.masked };
    println!("{}", serde_json::to_string_pretty(view)?);
    Ok(())
}

fn detect(scan: &Path) -> Result<()> {
    let content = fs::read_to_string(scan).with_context(|| format!("reading {}", scan.display()))?;
    let document: RawProviderDocument = serde_json::from_str(&content)
        .with_context(|| format!("parsing quick scan {}", scan.display()))?;

    let analyzer = DocumentAnalyzer::new(std::sync::Arc::new(LinguaIdentifier::new()));
    let characteristics = analyzer.detect(Some(&document));
    let selection = ExtractionRouter::select(&characteristics);

    println!("Document Characteristics:");
    println!("  Handwritten: {} ({:.1}%)", characteristics.is_handwritten, characteristics.handwriting_percentage * 100.0);
    println!("  Language: {}", characteristics.primary_language);
    println!("  Multilingual: {}", characteristics.is_multilingual);
    println!("  Complex tables: {}", characteristics.has_complex_tables);
    println!("  Detection confidence: {:.2}", characteristics.detection_confidence);
    println!();
    println!(
        "Selected providers: {}",
        selection.providers.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!("Reason: {}", selection.rationale);
    Ok(())
}

fn mask_record(path: &Path, level: MaskLevel, config: &PipelineConfig) -> Result<()> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let record: Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing record {}", path.display()))?;

    let outcome = DataMasker::new(level)
        .with_policy(config.masking_failure)
        .mask(&record);
    if let Some(failure) = &outcome.failure {
        eprintln!("Masking failed ({}), applied {:?} policy", failure, config.masking_failure);
    }
    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}
