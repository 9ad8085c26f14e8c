// src/cli/template.rs
//! Template commands

use clap::{Subcommand, ValueEnum};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DumpFormat {
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Create a template
    Add {
        /// Template as [user:]name
        template: String,

        /// Display title
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Comma-separated templates to include
        #[arg(long, value_delimiter = ',')]
        includes: Option<Vec<String>>,

        /// Make the template visible to everyone (0, 1, false, true)
        #[arg(long, value_parser = ["0", "1", "false", "true"])]
        public: Option<String>,
    },

    /// Change template metadata
    Update {
        /// Template as [user:]name
        template: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Comma-separated templates to include
        #[arg(long, value_delimiter = ',')]
        includes: Option<Vec<String>>,

        #[arg(long, value_parser = ["0", "1", "false", "true"])]
        public: Option<String>,
    },

    /// Delete a template
    Rm {
        /// Template as [user:]name
        template: String,
    },

    /// List templates
    List {
        /// Only templates owned by this user
        filter_user: Option<String>,

        /// Only public templates
        #[arg(long = "public")]
        public_only: bool,

        #[arg(long)]
        filter_name: Option<String>,

        #[arg(long)]
        filter_description: Option<String>,
    },

    /// Install and remove packages until the system matches the template
    Pull {
        /// Template as [user:]name
        template: String,

        /// Also remove user-installed packages the template does not list
        #[arg(long)]
        clean: bool,
    },

    /// Add this system's packages and enabled repositories to the template
    Push {
        /// Template as [user:]name
        template: String,

        /// Push every installed package, not only user-installed ones
        #[arg(long)]
        all: bool,
    },

    /// Compare a template with another template or with this system
    Diff {
        /// Template as [user:]name
        template_from: String,

        /// Template to compare against (default: this system)
        template_to: Option<String>,
    },

    /// Copy a template
    Copy {
        /// Source template as [user:]name
        template_from: String,

        /// Destination template as [user:]name
        template_to: String,
    },

    /// Print a template's stored form
    Dump {
        /// Template as [user:]name
        template: String,

        #[arg(long, value_enum, default_value = "json")]
        format: DumpFormat,
    },
}
