use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::theme::{Gender, SkinTone};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the composed page list of a book as JSON.
    Pages(PagesArgs),
    /// Render a print-ready PDF from a book JSON file.
    Render(RenderArgs),
    /// Run the delivery pipeline once for a stored order.
    Deliver(DeliverArgs),
}

#[derive(Debug, Args)]
pub struct PagesArgs {
    /// Child's name; only A-Z letters produce letter pages.
    #[arg(long)]
    pub name: String,

    #[arg(long, value_parser = parse_gender)]
    pub gender: Gender,

    #[arg(long, value_parser = parse_skin_tone)]
    pub skin_tone: SkinTone,

    /// Resolve against a directory of bundled assets.
    #[arg(long, conflicts_with = "asset_base_url")]
    pub assets_dir: Option<PathBuf>,

    /// Resolve against a remote asset host (overrides the config value).
    #[arg(long)]
    pub asset_base_url: Option<String>,

    /// Issue a HEAD request per remote asset and report its status.
    #[arg(long, default_value_t = false, requires = "asset_base_url")]
    pub probe: bool,

    /// Book config YAML.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Book JSON (`child_name`, `gender`, `skin_tone`, dedication fields).
    #[arg(long)]
    pub book: PathBuf,

    /// Output PDF path.
    #[arg(long)]
    pub out: PathBuf,

    /// Remote asset host (overrides the config value).
    #[arg(long)]
    pub asset_base_url: Option<String>,

    /// Book config YAML.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overwrite `--out` if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct DeliverArgs {
    /// Service data directory (overrides NAMEBOOK_DATA_DIR).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub order_id: String,
}

fn parse_gender(raw: &str) -> Result<Gender, String> {
    raw.parse().map_err(|err: anyhow::Error| err.to_string())
}

fn parse_skin_tone(raw: &str) -> Result<SkinTone, String> {
    raw.parse().map_err(|err: anyhow::Error| err.to_string())
}
