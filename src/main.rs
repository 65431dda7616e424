use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gallery_tools::{batch, convert, server, BatchCfg, GalleryCfg};

#[derive(Parser)]
#[command(name = "gallery", about = "Thumbnail, optimizer and preview-server tools for the photo gallery")]
struct Cli {
    /// YAML file replacing the built-in folder lists and server settings
    #[arg(long, global = true, env = "GALLERY_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create `<folder>_thumbnails` copies for the scrolling galleries
    Thumbnails,
    /// Recompress full-size images into `<folder>_optimized`
    Optimize,
    /// Serve the working directory with cache and CORS headers
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_cfg(path: Option<&PathBuf>) -> Result<GalleryCfg> {
    match path {
        Some(p) => GalleryCfg::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(GalleryCfg::default()),
    }
}

async fn run_batch(cfg: BatchCfg) -> Result<()> {
    if let Err(e) = convert::ensure_codecs() {
        println!("ERROR: {e}");
        println!("Rebuild with the `png` and `jpeg` features of the `image` crate enabled.");
        std::process::exit(1);
    }
    cfg.validate()?;

    batch::print_banner(cfg.kind);
    let kind = cfg.kind;
    let report = tokio::task::spawn_blocking(move || batch::run_batch(&cfg)).await??;
    tracing::debug!(
        processed = report.processed(),
        failed = report.failed(),
        skipped = report.skipped.len(),
        total_original = report.total_original(),
        total_output = report.total_output(),
        "batch finished"
    );
    batch::print_footer(kind);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_cfg(cli.config.as_ref())?;
    match cli.cmd {
        Cmd::Thumbnails => run_batch(cfg.thumbnails).await,
        Cmd::Optimize => run_batch(cfg.optimizer).await,
        Cmd::Serve { port, root } => {
            let mut srv = cfg.server;
            if let Some(port) = port { srv.port = port; }
            if let Some(root) = root { srv.root = root; }
            server::serve(srv).await
        }
    }
}
