// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: template as [user:]name
fn template_arg() -> Arg {
    Arg::new("template")
        .required(true)
        .help("Template as [user:]name")
}

/// Common argument: machine as [user:]name
fn machine_arg() -> Arg {
    Arg::new("machine")
        .required(true)
        .help("Machine as [user:]name")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn option(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help)
}

fn metadata_args(cmd: Command) -> Command {
    cmd.arg(option("title", "Human-readable title"))
        .arg(option("description", "Free-form description"))
}

fn template_metadata_args(cmd: Command) -> Command {
    metadata_args(cmd)
        .arg(option("includes", "Comma-separated templates to include"))
        .arg(option("public", "Make the template public (0, 1, false, true)"))
}

fn repo_option_args(cmd: Command) -> Command {
    cmd.arg(option("name", "Repository name"))
        .arg(option("baseurl", "Base URLs").num_args(1..))
        .arg(option("mirrorlist", "Mirror list URLs").num_args(1..))
        .arg(option("metalink", "Metalink URLs").num_args(1..))
        .arg(option("cost", "Repository cost"))
        .arg(option("priority", "Repository priority"))
        .arg(option("enabled", "Enable the repository (0, 1, false, true)"))
        .arg(option("gpgcheck", "Check GPG signatures (0, 1, false, true)"))
        .arg(option("gpgkey", "GPG key URLs").num_args(1..))
        .arg(option("exclude", "Package patterns to exclude").num_args(1..))
}

fn list_filter_args(cmd: Command) -> Command {
    cmd.arg(option("filter-user", "Only entries owned by this user"))
        .arg(option("filter-name", "Only entries with this name"))
        .arg(option("filter-description", "Only entries whose description contains this text"))
}

fn template_command() -> Command {
    Command::new("template")
        .about("Template management")
        .subcommand_required(true)
        .subcommand(template_metadata_args(
            Command::new("add").about("Create a template").arg(template_arg()),
        ))
        .subcommand(template_metadata_args(
            Command::new("update").about("Change template metadata").arg(template_arg()),
        ))
        .subcommand(Command::new("rm").about("Delete a template").arg(template_arg()))
        .subcommand(
            list_filter_args(Command::new("list").about("List templates"))
                .arg(flag("public", "Only public templates")),
        )
        .subcommand(
            Command::new("pull")
                .about("Install and remove packages until the system matches the template")
                .arg(template_arg())
                .arg(flag("clean", "Also remove user-installed packages the template does not list")),
        )
        .subcommand(
            Command::new("push")
                .about("Add this system's packages and enabled repositories to the template")
                .arg(template_arg())
                .arg(flag("all", "Push every installed package, not only user-installed ones")),
        )
        .subcommand(
            Command::new("diff")
                .about("Compare two templates, or a template against this system")
                .arg(Arg::new("template_from").required(true).help("Template as [user:]name"))
                .arg(Arg::new("template_to").help("Template as [user:]name (default: this system)")),
        )
        .subcommand(
            Command::new("copy")
                .about("Copy a template to a new name or owner")
                .arg(Arg::new("template_from").required(true).help("Template as [user:]name"))
                .arg(Arg::new("template_to").required(true).help("Template as [user:]name")),
        )
        .subcommand(
            Command::new("dump")
                .about("Print a template as JSON or YAML")
                .arg(template_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["json", "yaml"])
                        .default_value("json")
                        .help("Output format"),
                ),
        )
}

fn package_command() -> Command {
    let packages = || {
        Arg::new("packages")
            .required(true)
            .num_args(1..)
            .help("Packages as [~]name[#epoch][@version][-release][:arch]")
    };

    Command::new("package")
        .about("Package management within a template")
        .subcommand_required(true)
        .subcommand(Command::new("add").about("Add packages").arg(template_arg()).arg(packages()))
        .subcommand(
            Command::new("update")
                .about("Change packages already in the template")
                .arg(template_arg())
                .arg(packages()),
        )
        .subcommand(Command::new("list").about("List packages").arg(template_arg()))
        .subcommand(Command::new("rm").about("Remove packages").arg(template_arg()).arg(packages()))
}

fn repo_command() -> Command {
    let repo = || Arg::new("repo").required(true).help("Repository stub");

    Command::new("repo")
        .about("Repository management within a template")
        .subcommand_required(true)
        .subcommand(repo_option_args(
            Command::new("add").about("Add a repository").arg(template_arg()).arg(repo()),
        ))
        .subcommand(repo_option_args(
            Command::new("update")
                .about("Change a repository already in the template")
                .arg(template_arg())
                .arg(repo()),
        ))
        .subcommand(Command::new("list").about("List repositories").arg(template_arg()))
        .subcommand(
            Command::new("rm")
                .about("Remove repositories")
                .arg(template_arg())
                .arg(Arg::new("repos").required(true).num_args(1..).help("Repository stubs")),
        )
}

fn machine_command() -> Command {
    Command::new("machine")
        .about("Machine registration and sync")
        .subcommand_required(true)
        .subcommand(metadata_args(
            Command::new("add")
                .about("Register this host as a machine bound to a template")
                .arg(machine_arg())
                .arg(option("template", "Template as [user:]name").required(true)),
        ))
        .subcommand(metadata_args(
            Command::new("update")
                .about("Change a machine's template, title or description")
                .arg(machine_arg())
                .arg(option("template", "Template as [user:]name")),
        ))
        .subcommand(Command::new("rm").about("Delete a machine").arg(machine_arg()))
        .subcommand(list_filter_args(Command::new("list").about("List machines")))
        .subcommand(
            Command::new("diff")
                .about("Compare the machine's template against this system")
                .arg(machine_arg()),
        )
        .subcommand(
            Command::new("sync")
                .about("Sync this system to the machine's template")
                .arg(machine_arg()),
        )
        .subcommand(
            Command::new("cmd")
                .about("Run a command on a machine (not supported)")
                .arg(machine_arg())
                .arg(Arg::new("cmd").required(true))
                .arg(Arg::new("args").num_args(0..)),
        )
}

fn build_cli() -> Command {
    Command::new("cnvs")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Canvas Project")
        .about("Keep systems in step with Canvas templates")
        .subcommand_required(true)
        .arg(option("user", "Service user").short('U').global(true))
        .arg(option("host", "Service host").short('H').global(true))
        .arg(flag("verbose", "Enable debug logging").short('v').global(true))
        .arg(flag("dry-run", "Show what would change without changing anything").short('n').global(true))
        .subcommand(template_command())
        .subcommand(package_command())
        .subcommand(repo_command())
        .subcommand(machine_command())
        .subcommand(
            Command::new("config")
                .about("Get or set a configuration value")
                .arg(flag("unset", "Remove the key instead of reading or writing it"))
                .arg(Arg::new("name").required(true).help("Key as section.key"))
                .arg(Arg::new("value").help("New value")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = out_dir.join("cnvs.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
