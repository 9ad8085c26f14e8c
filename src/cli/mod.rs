// src/cli/mod.rs
//! CLI definitions for the Canvas client
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Command groups:
//! - `template` - Create, sync and compare templates
//! - `package` - Edit the packages of a template
//! - `repo` - Edit the repositories of a template
//! - `machine` - Register this host and sync it against its template
//! - `config` - Read and write local configuration values

use clap::{Parser, Subcommand};
use clap_complete::Shell;

mod machine;
mod package;
mod repo;
mod template;

pub use machine::MachineCommands;
pub use package::PackageCommands;
pub use repo::{RepoCommands, RepoOptions};
pub use template::{DumpFormat, TemplateCommands};

#[derive(Parser)]
#[command(name = "cnvs")]
#[command(author = "Canvas Project")]
#[command(version)]
#[command(about = "Keep systems in step with Canvas templates", long_about = None)]
pub struct Cli {
    /// Service user (default: `user.name` from config, then $SUDO_USER or $USER)
    #[arg(short = 'U', long, global = true)]
    pub user: Option<String>,

    /// Service host (default: `core.host` from config)
    #[arg(short = 'H', long, global = true)]
    pub host: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show what would change without changing anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Template management
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Package management within a template
    #[command(subcommand)]
    Package(PackageCommands),

    /// Repository management within a template
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Machine registration and sync
    #[command(subcommand)]
    Machine(MachineCommands),

    /// Get or set a configuration value
    Config {
        /// Remove the key instead of reading or writing it
        #[arg(long)]
        unset: bool,

        /// Key as `section.key`
        name: String,

        /// New value
        value: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
