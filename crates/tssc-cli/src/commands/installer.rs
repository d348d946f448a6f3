//! Installer command - inspect the resources embedded in the binary

use console::style;
use std::path::Path;
use tssc_core::chartfs::Extracted;

use crate::context::{Context, require_dir};
use crate::error::{CliError, Result};

pub fn run(ctx: &Context, list: bool, extract: Option<&Path>) -> Result<()> {
    if ctx.args.local.is_some() {
        return Err(CliError::usage("installer resources are only available in embedded mode"));
    }
    let cfs = ctx.chart_fs()?;

    match (list, extract) {
        (true, None) => {
            for entry in cfs.entries().filter(|e| e.is_file() && e.size() > 0) {
                println!("- {:?} ({} bytes)", entry.path, entry.size());
            }
            Ok(())
        }
        (false, Some(dest)) => {
            require_dir(dest, "extract target")?;
            for outcome in cfs.extract(dest)? {
                match outcome {
                    Extracted::Directory(path) => {
                        println!("- Creating directory {:?}", path.display().to_string())
                    }
                    Extracted::File(path) => println!("- Extracting {:?}", path.display().to_string()),
                    Extracted::Symlink { path, target } => println!(
                        "- Creating symlink {:?} -> {:?}",
                        path.display().to_string(),
                        target.display().to_string()
                    ),
                    Extracted::SymlinkUnchanged(path) => {
                        println!("- Symlink {:?} is up to date", path.display().to_string())
                    }
                    Extracted::Skipped { path, reason } => eprintln!(
                        "{} Skipping {:?}: {reason}",
                        style("⚠").yellow(),
                        path.display().to_string()
                    ),
                }
            }
            Ok(())
        }
        (true, Some(_)) => Err(CliError::usage("--list and --extract are mutually exclusive")),
        (false, None) => Err(CliError::usage("either --list or --extract must be set")),
    }
}
