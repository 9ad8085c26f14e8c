// src/cli/package.rs
//! Package commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Add packages to a template
    ///
    /// Packages use the compact form `[+|~]name[#epoch]@version-release[:arch]`;
    /// a leading `~` excludes the package.
    Add {
        /// Template as [user:]name
        template: String,

        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Change the version, arch or action of packages already in a template
    Update {
        /// Template as [user:]name
        template: String,

        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// List the packages of a template, including inherited ones
    List {
        /// Template as [user:]name
        template: String,
    },

    /// Remove packages from a template
    Rm {
        /// Template as [user:]name
        template: String,

        #[arg(required = true)]
        packages: Vec<String>,
    },
}
