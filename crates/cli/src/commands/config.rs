//! Config Commands

use anyhow::{bail, Result};
use clap::Subcommand;

use runwatch_monitor::ClientConfig;

use super::Context;
use crate::output::{print_info, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

pub fn execute(cmd: ConfigCommands, ctx: &Context) -> Result<i32> {
    match cmd {
        ConfigCommands::Init { force } => {
            let path = &ctx.config_path;
            if path.exists() && !force {
                bail!(
                    "{} already exists, pass --force to overwrite it",
                    path.display()
                );
            }
            ClientConfig::default().save(path)?;
            print_success(&format!("Wrote default configuration to {}", path.display()));
        }
        ConfigCommands::Show => match ctx.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&ctx.config)?);
            }
            _ => {
                if !ctx.config_path.exists() {
                    print_info(&format!(
                        "{} not found, showing defaults",
                        ctx.config_path.display()
                    ));
                }
                print!("{}", toml::to_string_pretty(&ctx.config)?);
            }
        },
    }
    Ok(0)
}
