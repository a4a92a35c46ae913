//! styl-bridge CLI tool
//!
//! Command-line interface for rendering stylesheets with package-aware imports.
//!
//! ## Commands
//!
//! - `render <path>`: Render a document, or every document under a directory
//! - `scan <path>`: List the imports the static scanner finds in a document

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use styl_bridge::{
    config::LoaderOptions,
    host::{FsHost, FsTree},
    job::compile,
    render::InlineRenderer,
    scan::scan_imports,
    BridgeError,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "styl-bridge")]
#[command(author, version, about = "Render stylesheets whose imports resolve like modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document, or every document under a directory
    Render {
        /// Path to the document or directory to render
        path: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Configuration profile
        #[arg(short, long)]
        profile: Option<String>,

        /// Output file, or output directory when rendering a directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the dependency list of each document
        #[arg(long)]
        deps: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the imports the static scanner finds in a document
    Scan {
        /// Path to the document
        path: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Configuration profile
        #[arg(short, long)]
        profile: Option<String>,
    },
}

fn load_options(config: Option<&Path>, profile: Option<&str>) -> Result<LoaderOptions, BridgeError> {
    match config {
        Some(path) => LoaderOptions::load(path, profile),
        None => Ok(LoaderOptions::default()),
    }
}

fn documents(path: &Path, options: &LoaderOptions) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| options.dialect.is_dialect_file(p))
        .filter(|p| {
            !p.components()
                .any(|c| options.module_dirs.iter().any(|dir| c.as_os_str() == dir.as_str()))
        })
        .collect()
}

fn output_path(root: &Path, document: &Path, out: &Path) -> PathBuf {
    if root.is_file() {
        return out.to_path_buf();
    }
    let relative = document.strip_prefix(root).unwrap_or(document);
    out.join(relative).with_extension("css")
}

async fn render(
    path: PathBuf,
    options: LoaderOptions,
    out: Option<PathBuf>,
    deps: bool,
    verbose: bool,
) -> Result<(), BridgeError> {
    let path = std::path::absolute(&path)?;
    let host = FsHost::new(&options);
    let mut renderer = InlineRenderer::new();

    for document in documents(&path, &options) {
        if verbose {
            println!("Rendering: {:?}", document);
        }
        let source = tokio::fs::read_to_string(&document).await?;
        let output = compile(
            &host,
            FsTree,
            &mut renderer,
            document.clone(),
            source,
            options.clone(),
        )
        .await?;

        match &out {
            Some(out) => {
                let target = output_path(&path, &document, out);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &output.css).await?;
                if let Some(map) = &output.source_map {
                    tokio::fs::write(target.with_extension("css.map"), map).await?;
                }
                if verbose {
                    println!("Wrote {:?} ({} attempt(s))", target, output.attempts);
                }
            }
            None => print!("{}", output.css),
        }

        if deps {
            println!("\n=== Dependencies of {} ===", document.display());
            for dependency in &output.dependencies {
                println!("{}", dependency.display());
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            path,
            config,
            profile,
            out,
            deps,
            verbose,
        } => {
            let options = load_options(config.as_deref(), profile.as_deref())?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(render(path, options, out, deps, verbose))?;
            Ok(())
        }

        Commands::Scan {
            path,
            config,
            profile,
        } => {
            let options = load_options(config.as_deref(), profile.as_deref())?;
            let path = std::path::absolute(&path)?;
            let source = std::fs::read_to_string(&path)?;
            for import in scan_imports(&path, &source, &options.scan_tables(), &options.dialect) {
                println!(
                    "{:?}\t{}\t{}",
                    import.kind,
                    import.name,
                    options.request_for(&import.name)
                );
            }
            Ok(())
        }
    }
}
