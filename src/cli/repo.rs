// src/cli/repo.rs
//! Repository commands

use clap::{Args, Subcommand};

/// Repository fields settable from the command line
#[derive(Args, Debug, Default, Clone)]
pub struct RepoOptions {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub cost: Option<i64>,

    #[arg(long)]
    pub priority: Option<i64>,

    #[arg(long, num_args = 1..)]
    pub baseurl: Option<Vec<String>>,

    #[arg(long, num_args = 1..)]
    pub mirrorlist: Option<Vec<String>>,

    #[arg(long, num_args = 1..)]
    pub metalink: Option<Vec<String>>,

    #[arg(long, value_parser = ["0", "1", "false", "true"])]
    pub enabled: Option<String>,

    #[arg(long, value_parser = ["0", "1", "false", "true"])]
    pub gpgcheck: Option<String>,

    #[arg(long, num_args = 1..)]
    pub gpgkey: Option<Vec<String>>,

    /// Packages to exclude from this repository
    #[arg(long, num_args = 1..)]
    pub exclude: Option<Vec<String>>,
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// Add a repository to a template
    Add {
        /// Template as [user:]name
        template: String,

        /// Repository stub
        repo: String,

        #[command(flatten)]
        options: RepoOptions,
    },

    /// Change a repository already in a template
    Update {
        /// Template as [user:]name
        template: String,

        /// Repository stub
        repo: String,

        #[command(flatten)]
        options: RepoOptions,
    },

    /// List the repositories of a template, including inherited ones
    List {
        /// Template as [user:]name
        template: String,
    },

    /// Remove repositories from a template
    Rm {
        /// Template as [user:]name
        template: String,

        #[arg(required = true)]
        repos: Vec<String>,
    },
}
