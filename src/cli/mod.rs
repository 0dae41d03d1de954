//! Command-line interface definitions for the `kiln` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `kiln` binary.
#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    about = "Build reusable Google Compute Engine images from a disposable instance",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision an instance, capture its disk as an image and tear it down.
    #[command(
        name = "build",
        about = "Provision an instance, capture its disk as an image and tear it down"
    )]
    Build(BuildCommand),
    /// Delete an image produced by an earlier build.
    #[command(name = "destroy-image", about = "Delete an image produced by an earlier build")]
    DestroyImage(DestroyImageCommand),
    /// List zones, machine types and images visible to the project.
    #[command(
        name = "inventory",
        about = "List zones, machine types and images visible to the project"
    )]
    Inventory(InventoryCommand),
}

/// Arguments for the `kiln build` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct BuildCommand {
    /// Shell command to run on the instance before capture. Repeat the flag
    /// to run several commands in order.
    #[arg(long = "provision", value_name = "CMD")]
    pub(crate) provision: Vec<String>,
    /// Instance metadata entry. Repeat the flag for several entries.
    #[arg(long = "metadata", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub(crate) metadata: Vec<(String, String)>,
    /// Network tag applied to the instance. Repeat the flag for several tags.
    #[arg(long = "tag", value_name = "TAG")]
    pub(crate) tags: Vec<String>,
    /// Refresh `gsutil` on the instance before capturing.
    #[arg(long)]
    pub(crate) update_gsutil: bool,
    /// Pause after every step until Enter is pressed.
    #[arg(long)]
    pub(crate) debug: bool,
}

/// Arguments for the `kiln destroy-image` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyImageCommand {
    /// Name of the image to delete.
    #[arg(value_name = "NAME")]
    pub(crate) name: String,
}

/// Arguments for the `kiln inventory` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InventoryCommand {
    /// Zone whose machine types are listed; defaults to the configured zone.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Project whose images are listed in addition to the own project.
    #[arg(long, value_name = "PROJECT")]
    pub(crate) image_project: Option<String>,
}

/// Splits a `KEY=VALUE` argument at the first `=`.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let trimmed_key = key.trim();
    if trimmed_key.is_empty() {
        return Err(format!("metadata key must not be empty in '{raw}'"));
    }
    Ok((trimmed_key.to_owned(), value.to_owned()))
}
