use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use offline_site_reconciler::{ProjectConfig, Reconciler, VariantOutcome, run_variants};

#[derive(Parser)]
#[command(
  name = "offline_site_reconciler",
  version,
  about = "Reconcile asset references of a scraped site export with the files on disk"
)]
struct Cli {
  /// Project root containing the document and the asset tree.
  #[arg(long, value_name = "DIR", default_value = ".", global = true)]
  root: PathBuf,
  /// Configuration file; `reconcile.config.json` in the root is used when omitted.
  #[arg(long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,
  /// Report what would change without writing or fetching anything.
  #[arg(long)]
  dry_run: bool,
  /// Log at debug level unless `RUST_LOG` says otherwise.
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Create the resized variants listed in the configuration.
  Variants,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err:?}");
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let config = match &cli.config {
    Some(path) => ProjectConfig::from_path(path)?,
    None => ProjectConfig::discover(&cli.root),
  };
  let layout = config.into_layout(&cli.root);

  match cli.command {
    Some(Command::Variants) => {
      let outcomes = run_variants(&layout.asset_root, &layout.variants);
      for outcome in &outcomes {
        match outcome {
          VariantOutcome::Created {
            path,
            width,
            height,
          } => println!("created {path} ({width}x{height})"),
          VariantOutcome::Skipped { path } => println!("skipped {path}: already exists"),
          VariantOutcome::Failed { source, reason } => println!("failed {source}: {reason}"),
        }
      }
      Ok(())
    }
    None => {
      let report = Reconciler::new(&layout)
        .dry_run(cli.dry_run)
        .run()
        .with_context(|| format!("reconciling {}", layout.document_path.display()))?;

      println!("{}", report.render_summary());
      if let Some(path) = &layout.report_path {
        if cli.dry_run {
          tracing::info!("dry run: report not written to {}", path.display());
        } else {
          report.write_json(path)?;
        }
      }
      Ok(())
    }
  }
}
