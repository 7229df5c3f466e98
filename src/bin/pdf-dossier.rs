//! PDF Dossier CLI tool
//!
//! Merge, annotate, compress and compose application documents.

use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use glob::glob;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pdf_dossier::color::{hex_to_rgb, Color};
use pdf_dossier::compose::DocumentPlan;
use pdf_dossier::export;
use pdf_dossier::layout::{Orientation, PageFormat};
use pdf_dossier::markup::{MarkupNode, RasterOptions};
use pdf_dossier::pdf::{
    inspect, Anchor, CompressionProfile, DocumentMetadata, MergeSource, PageNumberSpec,
    WatermarkSpec,
};
use pdf_dossier::{ByteBuffer, Engine, EngineConfig, PipelineRequest, Production};

/// PDF Dossier - Assemble application documents
#[derive(Parser)]
#[command(name = "pdf-dossier")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Merge with bookmarks and page numbers
    pdf-dossier merge -o bewerbung.pdf Anschreiben=cover.pdf Lebenslauf=cv.pdf \"zeugnisse/*.pdf\" --page-numbers

    # Mark a document as a draft
    pdf-dossier watermark cv.pdf -o cv-draft.pdf --text ENTWURF

    # Shrink a scan-heavy document
    pdf-dossier compress zeugnis.pdf -o zeugnis-klein.pdf --profile high

    # Build a cover letter from a JSON plan and open it
    pdf-dossier compose anschreiben.json -o anschreiben.pdf --open")]
struct Cli {
    /// JSON engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge multiple PDF files into one
    Merge {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        /// and NAME=PATH to set a bookmark title
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// Bookmark every input without a NAME= by its file stem
        #[arg(long)]
        bookmarks: bool,

        /// Stamp running page numbers
        #[arg(long)]
        page_numbers: bool,

        /// Page number template with {current} and {total}
        #[arg(long)]
        template: Option<String>,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// Document author
        #[arg(long)]
        author: Option<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Stamp a diagonal watermark on every page
    Watermark {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// Watermark text
        #[arg(long)]
        text: String,

        /// Font size in points
        #[arg(long, default_value_t = 60.0)]
        font_size: f32,

        /// Fill opacity between 0 and 1
        #[arg(long, default_value_t = 0.15)]
        opacity: f32,

        /// Rotation in degrees, counter-clockwise
        #[arg(long, default_value_t = -45.0, allow_negative_numbers = true)]
        rotation: f32,

        /// Text colour as #rrggbb
        #[arg(long)]
        color: Option<String>,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Stamp running page numbers
    Number {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// Template with {current} and {total}
        #[arg(long)]
        template: Option<String>,

        /// bottom-left, bottom-right, top-center or bottom-center
        #[arg(long, default_value = "bottom-center")]
        anchor: String,

        /// Font size in points
        #[arg(long, default_value_t = 10.0)]
        font_size: f32,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Re-encode a PDF to save space
    Compress {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// low, medium or high
        #[arg(long, default_value = "medium")]
        profile: String,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Lay out a document from a JSON plan
    Compose {
        /// JSON document plan
        plan: PathBuf,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Convert HTML to PDF with the external rasterizer
    Render {
        /// HTML file
        input: PathBuf,

        /// Output PDF file path, or a directory for the default filename
        #[arg(short, long)]
        output: PathBuf,

        /// Document title
        #[arg(long)]
        title: Option<String>,

        /// a3, a4, a5, letter or legal
        #[arg(long, default_value = "a4")]
        page_format: String,

        /// Use landscape orientation
        #[arg(long)]
        landscape: bool,

        /// Page margin in millimetres
        #[arg(long, default_value_t = 20.0)]
        margin: f64,

        /// Open the output file after creation
        #[arg(long)]
        open: bool,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = Engine::new(config);

    match cli.command {
        Commands::Merge {
            inputs,
            output,
            bookmarks,
            page_numbers,
            template,
            title,
            author,
            open,
        } => {
            let mut sources = Vec::new();
            for (name, path) in expand_inputs(inputs)? {
                let name = name.or_else(|| {
                    bookmarks
                        .then(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                        .flatten()
                });
                let bytes = read_input(&path)?;
                sources.push((name, bytes));
            }
            eprintln!("Merging {} PDF files...", sources.len());

            let mut sources = sources.into_iter();
            let Some((first_name, first)) = sources.next() else {
                bail!("No input files");
            };
            let mut request = PipelineRequest::new(Production::Buffer(first));
            request.display_name = first_name;
            request.attachments = sources
                .map(|(name, bytes)| MergeSource {
                    input: bytes.into(),
                    display_name: name,
                })
                .collect();
            request.merge_options.metadata = DocumentMetadata {
                title,
                author,
                creation_date: Some(chrono::Utc::now()),
                ..Default::default()
            };
            if page_numbers {
                request.page_numbers = Some(page_number_spec(template, Anchor::default(), None));
            }

            let result = engine.run(request).await?;
            for bookmark in &result.bookmarks {
                eprintln!("  {} -> page {}", bookmark.title, bookmark.page_index + 1);
            }
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Watermark {
            input,
            output,
            text,
            font_size,
            opacity,
            rotation,
            color,
            open,
        } => {
            let mut spec = WatermarkSpec::new(text);
            spec.font_size = font_size;
            spec.opacity = opacity;
            spec.rotation_degrees = rotation;
            if let Some(hex) = color {
                spec.color = Color::from(hex_to_rgb(&hex));
            }
            let mut request = PipelineRequest::new(Production::Buffer(read_input(&input)?));
            request.watermark = Some(spec);
            let result = engine.run(request).await?;
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Number {
            input,
            output,
            template,
            anchor,
            font_size,
            open,
        } => {
            let anchor = parse::<Anchor>(&anchor)?;
            let mut request = PipelineRequest::new(Production::Buffer(read_input(&input)?));
            request.page_numbers = Some(page_number_spec(template, anchor, Some(font_size)));
            let result = engine.run(request).await?;
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Compress {
            input,
            output,
            profile,
            open,
        } => {
            let profile = parse::<CompressionProfile>(&profile)?;
            let buffer = read_input(&input)?;
            let before = buffer.len();
            let mut request = PipelineRequest::new(Production::Buffer(buffer));
            request.compression = Some(profile);
            let result = engine.run(request).await?;
            eprintln!("{} -> {} bytes", before, result.buffer.len());
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Compose { plan, output, open } => {
            let text = std::fs::read_to_string(&plan)
                .with_context(|| format!("reading {}", plan.display()))?;
            let plan = DocumentPlan::from_json(&text)?;
            let result = engine.run(PipelineRequest::new(Production::Compose(plan))).await?;
            eprintln!("Composed {} pages", result.page_count);
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Render {
            input,
            output,
            title,
            page_format,
            landscape,
            margin,
            open,
        } => {
            let html = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let options = RasterOptions {
                page_format: parse::<PageFormat>(&page_format)?,
                orientation: if landscape {
                    Orientation::Landscape
                } else {
                    Orientation::Portrait
                },
                margin_mm: margin,
            };
            let node = MarkupNode { html, title };
            let result = engine
                .run(PipelineRequest::new(Production::Markup { node, options }))
                .await?;
            finish(&engine, &result.buffer, &output, open)?;
        }
        Commands::Info { input, json } => {
            let info = inspect(&read_input(&input)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("File: {}", input.display());
                println!("Pages: {}", info.page_count);
                let fields = [
                    ("Title", &info.title),
                    ("Author", &info.author),
                    ("Subject", &info.subject),
                    ("Keywords", &info.keywords),
                    ("Created", &info.creation_date),
                ];
                for (label, value) in fields {
                    if let Some(value) = value {
                        println!("{}: {}", label, value);
                    }
                }
                if !info.bookmarks.is_empty() {
                    println!("Bookmarks:");
                    for bookmark in &info.bookmarks {
                        println!("  {} (page {})", bookmark.title, bookmark.page_index + 1);
                    }
                }
            }
        }
    }

    Ok(())
}

fn parse<T>(value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| anyhow!("{}", e))
}

fn page_number_spec(
    template: Option<String>,
    anchor: Anchor,
    font_size: Option<f32>,
) -> PageNumberSpec {
    let defaults = PageNumberSpec::default();
    PageNumberSpec {
        template: template.unwrap_or(defaults.template),
        font_size: font_size.unwrap_or(defaults.font_size),
        anchor,
        ..defaults
    }
}

fn read_input(path: &Path) -> anyhow::Result<ByteBuffer> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(ByteBuffer::new(bytes))
}

/// Save the result next to `output` and optionally open it
/// Save under `output`; an existing directory gets the configured default filename
fn finish(engine: &Engine, buffer: &ByteBuffer, output: &Path, open: bool) -> anyhow::Result<()> {
    let (dir, name) = if output.is_dir() {
        (output, None)
    } else {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        (dir, output.file_name().map(|n| n.to_string_lossy().into_owned()))
    };
    let saved = engine.save(buffer, name.as_deref(), dir)?;
    eprintln!("Output: {}", saved.display());

    if open {
        export::open_in_viewer(&saved)?;
    }
    Ok(())
}

/// Expand glob patterns and split off `NAME=` prefixes
fn expand_inputs(patterns: Vec<String>) -> anyhow::Result<Vec<(Option<String>, PathBuf)>> {
    let mut inputs = Vec::new();

    for pattern in patterns {
        let (name, pattern) = match pattern.split_once('=') {
            Some((name, path)) if !name.is_empty() && !Path::new(&pattern).exists() => {
                (Some(name.to_string()), path.to_string())
            }
            _ => (None, pattern),
        };

        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched: Vec<PathBuf> = Vec::new();
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => matched.push(path),
                    Err(e) => warn!("glob error for {}: {}", pattern, e),
                }
            }
            if matched.is_empty() {
                bail!("No files matched pattern: {}", pattern);
            }
            // Sort paths for consistent ordering within one pattern
            matched.sort();
            // A name only marks the first file of its pattern
            let mut name = name;
            for path in matched {
                inputs.push((name.take(), path));
            }
        } else {
            inputs.push((name, PathBuf::from(pattern)));
        }
    }

    Ok(inputs)
}
