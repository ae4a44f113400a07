use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use archivist_config::{ArchivistConfig, ConfigSource, init_tracing};
use archivist_core::context::ArchiveContext;
use archivist_core::import::{DuplicateChoice, FixedChoice, ImportCandidate};
use archivist_core::library::SourceRemoval;
use archivist_core::vault::is_image_path;
use archivist_model::SourceId;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "archivist-sync", about = "Keep an Archivist library in sync with its vaults")]
struct Cli {
    /// Config file (TOML or JSON). Overrides ARCHIVIST_CONFIG_PATH.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drop records whose files are gone and fix their owning source
    Reconcile {
        /// Also import image files no record points at
        #[arg(long)]
        rescan: bool,
    },
    /// Watch every vault until Ctrl-C
    Watch,
    /// Import image files into a vault
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Import files whose bytes are already in the library
        #[arg(long)]
        keep_duplicates: bool,
        /// Target source id (defaults to the internal vault)
        #[arg(long)]
        source: Option<String>,
    },
    /// Link a folder as a vault
    Link { name: String, path: PathBuf },
    /// Unlink a folder
    Unlink {
        source_id: String,
        /// Delete the folder's records instead of handing them to the internal vault
        #[arg(long)]
        delete_images: bool,
    },
    /// Run a reconcile pass and print the sync log
    Log {
        #[arg(long)]
        rescan: bool,
    },
    /// List sources and their image counts
    Sources,
}

fn load_config(explicit: Option<PathBuf>) -> Result<(ArchivistConfig, ConfigSource)> {
    match explicit {
        Some(path) => {
            let config = ArchivistConfig::load_from_file(&path)?;
            Ok((config, ConfigSource::File(path)))
        }
        None => ArchivistConfig::load_from_env(),
    }
}

async fn candidate(path: PathBuf) -> Result<ImportCandidate> {
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let text = tokio::fs::read_to_string(path.with_extension("txt")).await.ok();
    let candidate = ImportCandidate::from_file(&path, bytes);
    Ok(match text {
        Some(text) => candidate.with_text(text),
        None => candidate,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = load_config(cli.config)?;
    init_tracing(&config.logging.filter)?;
    info!(?source, "configuration loaded");

    let choice = match &cli.command {
        Command::Import {
            keep_duplicates: true,
            ..
        } => DuplicateChoice::Keep,
        _ => DuplicateChoice::Skip,
    };
    let ctx = ArchiveContext::build(config.into_runtime(), Arc::new(FixedChoice(choice)))
        .await
        .context("failed to open archive")?;

    match cli.command {
        Command::Reconcile { rescan } => {
            let summary = ctx.pass.run(rescan).await?;
            println!(
                "updated {}, orphaned {}, imported {}",
                summary.updated, summary.orphaned, summary.imported
            );
        }
        Command::Watch => {
            ctx.start().await?;
            let summary = ctx.pass.run(true).await?;
            info!(
                updated = summary.updated,
                orphaned = summary.orphaned,
                imported = summary.imported,
                "startup reconcile finished"
            );
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("shutting down");
            ctx.shutdown();
        }
        Command::Import {
            files,
            source,
            ..
        } => {
            let target = match source {
                Some(id) => SourceId::from_string(id)?,
                None => SourceId::internal(),
            };
            let mut candidates = Vec::with_capacity(files.len());
            for path in files {
                if !is_image_path(&path) {
                    warn!(path = %path.display(), "not an image, skipping");
                    continue;
                }
                candidates.push(candidate(path).await?);
            }
            if candidates.is_empty() {
                bail!("no image files to import");
            }
            let report = ctx.importer.import(candidates, &target, "command line").await?;
            println!(
                "imported {}, skipped {} duplicates",
                report.imported.len(),
                report.skipped
            );
        }
        Command::Link { name, path } => {
            let path = std::path::absolute(&path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            let source = ctx.library.add_local_folder(&name, &path).await?;
            println!("linked {} as {}", path.display(), source.id);
        }
        Command::Unlink {
            source_id,
            delete_images,
        } => {
            let id = SourceId::from_string(source_id)?;
            let removal = if delete_images {
                SourceRemoval::DeleteImages
            } else {
                SourceRemoval::Reassign
            };
            let affected = ctx.library.remove_source(&id, removal).await?;
            println!("unlinked {id}, {affected} images affected");
        }
        Command::Log { rescan } => {
            ctx.pass.run(rescan).await?;
            for entry in ctx.engine.log().entries() {
                println!("{entry}");
            }
        }
        Command::Sources => {
            let snapshot = ctx.library.refresh(true).await?;
            for source in snapshot.sources {
                let path = source
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<40} {:<24} {:>6}  {path}", source.id, source.name, source.count);
            }
        }
    }
    Ok(())
}
