// src/cli/machine.rs
//! Machine commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum MachineCommands {
    /// Register this host as a machine bound to a template
    Add {
        /// Machine as [user:]name
        machine: String,

        /// Template as [user:]name
        #[arg(long)]
        template: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Change a machine's template, title or description
    Update {
        /// Machine as [user:]name
        machine: String,

        /// Template as [user:]name
        #[arg(long)]
        template: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a machine and forget its credentials
    Rm {
        /// Machine as [user:]name
        machine: String,
    },

    /// List machines
    List {
        /// Only machines owned by this user
        filter_user: Option<String>,

        #[arg(long)]
        filter_name: Option<String>,

        #[arg(long)]
        filter_description: Option<String>,
    },

    /// Compare the machine's template with this system
    Diff {
        /// Machine as [user:]name
        machine: String,
    },

    /// Install and remove packages until this system matches its template
    Sync {
        /// Machine as [user:]name
        machine: String,
    },

    /// Run a command on a machine
    Cmd {
        /// Machine as [user:]name
        machine: String,

        cmd: String,

        args: Vec<String>,
    },
}
