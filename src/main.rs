// src/main.rs

use anyhow::Result;
use canvas::backend::DnfBackend;
use canvas::service::ListFilter;
use canvas::Config;
use clap::{CommandFactory, Parser};
use std::io;
use std::process;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Commands, MachineCommands, PackageCommands, RepoCommands, TemplateCommands};
use commands::{CommandContext, MachineFields, TemplateFields};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = Config::load()?;
    let ctx = CommandContext::new(cli.user, cli.host, cli.dry_run, &config);
    debug!("Using {} as {}", ctx.host, ctx.user);

    let code = commands::finish(run(cli.command, &ctx, &mut config))?;
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}

fn run(command: Commands, ctx: &CommandContext, config: &mut Config) -> Result<i32> {
    match command {
        Commands::Template(cmd) => run_template(cmd, ctx),
        Commands::Package(cmd) => run_package(cmd, ctx),
        Commands::Repo(cmd) => run_repo(cmd, ctx),
        Commands::Machine(cmd) => run_machine(cmd, ctx, config),
        Commands::Config { unset, name, value } => {
            commands::cmd_config(config, unset, &name, value.as_deref())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cnvs", &mut io::stdout());
            Ok(0)
        }
    }
}

fn run_template(cmd: TemplateCommands, ctx: &CommandContext) -> Result<i32> {
    let mut store = ctx.connect()?;

    match cmd {
        TemplateCommands::Add {
            template,
            title,
            description,
            includes,
            public,
        } => commands::cmd_template_add(
            ctx,
            &mut store,
            &template,
            TemplateFields {
                title,
                description,
                includes,
                public,
            },
        ),
        TemplateCommands::Update {
            template,
            title,
            description,
            includes,
            public,
        } => commands::cmd_template_update(
            ctx,
            &mut store,
            &template,
            TemplateFields {
                title,
                description,
                includes,
                public,
            },
        ),
        TemplateCommands::Rm { template } => commands::cmd_template_rm(ctx, &mut store, &template),
        TemplateCommands::List {
            filter_user,
            public_only,
            filter_name,
            filter_description,
        } => {
            let filter = ListFilter {
                user: filter_user,
                name: filter_name,
                description: filter_description,
                public_only,
            };
            commands::cmd_template_list(&mut store, &filter)
        }
        TemplateCommands::Pull { template, clean } => {
            let mut backend = DnfBackend::new()?;
            commands::cmd_template_pull(ctx, &mut store, &mut backend, &template, clean)
        }
        TemplateCommands::Push { template, all } => {
            let backend = DnfBackend::new()?;
            commands::cmd_template_push(ctx, &mut store, &backend, &template, all)
        }
        TemplateCommands::Diff {
            template_from,
            template_to,
        } => {
            let backend = DnfBackend::new()?;
            commands::cmd_template_diff(
                ctx,
                &mut store,
                &backend,
                &template_from,
                template_to.as_deref(),
            )
        }
        TemplateCommands::Copy {
            template_from,
            template_to,
        } => commands::cmd_template_copy(ctx, &mut store, &template_from, &template_to),
        TemplateCommands::Dump { template, format } => {
            commands::cmd_template_dump(ctx, &mut store, &template, format)
        }
    }
}

fn run_package(cmd: PackageCommands, ctx: &CommandContext) -> Result<i32> {
    let mut store = ctx.connect()?;

    match cmd {
        PackageCommands::Add { template, packages } => {
            commands::cmd_package_add(ctx, &mut store, &template, &packages)
        }
        PackageCommands::Update { template, packages } => {
            commands::cmd_package_update(ctx, &mut store, &template, &packages)
        }
        PackageCommands::List { template } => commands::cmd_package_list(ctx, &mut store, &template),
        PackageCommands::Rm { template, packages } => {
            commands::cmd_package_rm(ctx, &mut store, &template, &packages)
        }
    }
}

fn run_repo(cmd: RepoCommands, ctx: &CommandContext) -> Result<i32> {
    let mut store = ctx.connect()?;

    match cmd {
        RepoCommands::Add {
            template,
            repo,
            options,
        } => commands::cmd_repo_add(ctx, &mut store, &template, &repo, &options),
        RepoCommands::Update {
            template,
            repo,
            options,
        } => commands::cmd_repo_update(ctx, &mut store, &template, &repo, &options),
        RepoCommands::List { template } => commands::cmd_repo_list(ctx, &mut store, &template),
        RepoCommands::Rm { template, repos } => {
            commands::cmd_repo_rm(ctx, &mut store, &template, &repos)
        }
    }
}

fn run_machine(cmd: MachineCommands, ctx: &CommandContext, config: &mut Config) -> Result<i32> {
    let mut store = ctx.connect()?;

    match cmd {
        MachineCommands::Add {
            machine,
            template,
            title,
            description,
        } => commands::cmd_machine_add(
            ctx,
            &mut store,
            config,
            &machine,
            MachineFields {
                template: Some(template),
                title,
                description,
            },
        ),
        MachineCommands::Update {
            machine,
            template,
            title,
            description,
        } => commands::cmd_machine_update(
            ctx,
            &mut store,
            &machine,
            MachineFields {
                template,
                title,
                description,
            },
        ),
        MachineCommands::Rm { machine } => {
            commands::cmd_machine_rm(ctx, &mut store, config, &machine)
        }
        MachineCommands::List {
            filter_user,
            filter_name,
            filter_description,
        } => {
            let filter = ListFilter {
                user: filter_user,
                name: filter_name,
                description: filter_description,
                public_only: false,
            };
            commands::cmd_machine_list(&mut store, &filter)
        }
        MachineCommands::Diff { machine } => {
            let backend = DnfBackend::new()?;
            commands::cmd_machine_diff(&mut store, &backend, config, &machine)
        }
        MachineCommands::Sync { machine } => {
            let mut backend = DnfBackend::new()?;
            commands::cmd_machine_sync(ctx, &mut store, &mut backend, config, &machine)
        }
        MachineCommands::Cmd { machine, cmd, args } => {
            commands::cmd_machine_cmd(&machine, &cmd, &args)
        }
    }
}
