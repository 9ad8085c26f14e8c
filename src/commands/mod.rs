// src/commands/mod.rs
//! Command handlers for the Canvas CLI
//!
//! Every handler returns the process exit code. Service failures are
//! reported as `error: <reason>` and become exit code 1 at [`finish`];
//! anything else propagates to `main`.

mod config;
mod machine;
mod package;
mod repo;
mod template;

pub use config::cmd_config;
pub use machine::{
    cmd_machine_add, cmd_machine_cmd, cmd_machine_diff, cmd_machine_list, cmd_machine_rm,
    cmd_machine_sync, cmd_machine_update, MachineFields,
};
pub use package::{cmd_package_add, cmd_package_list, cmd_package_rm, cmd_package_update};
pub use repo::{cmd_repo_add, cmd_repo_list, cmd_repo_rm, cmd_repo_update};
pub use template::{
    cmd_template_add, cmd_template_copy, cmd_template_diff, cmd_template_dump,
    cmd_template_list, cmd_template_pull, cmd_template_push, cmd_template_rm,
    cmd_template_update, TemplateFields,
};

use anyhow::Result;
use canvas::model::{parse_bool, TemplateRef};
use canvas::service::{ServiceClient, DEFAULT_HOST};
use canvas::sync::StagedChanges;
use canvas::{Config, Error};
use std::env;
use std::io::{self, BufRead, Write};

/// Environment variable consulted before prompting for a password
pub const PASSWORD_ENV: &str = "CANVAS_PASSWORD";

const DRY_RUN_FOOTER: &str = "No action performed during this dry-run.";

/// Settings shared by every command, resolved once per invocation
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user: String,
    pub host: String,
    pub dry_run: bool,
}

impl CommandContext {
    /// CLI flag, then config value, then built-in default
    pub fn new(
        user: Option<String>,
        host: Option<String>,
        dry_run: bool,
        config: &Config,
    ) -> Self {
        let user = user
            .or_else(|| config.get("user", "name").map(str::to_string))
            .unwrap_or_else(invoking_user);
        let host = host
            .or_else(|| config.get("core", "host").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        Self {
            user,
            host,
            dry_run,
        }
    }

    /// Parse `[user:]name`, defaulting the user to the invoking one
    pub fn reference(&self, input: &str) -> Result<TemplateRef> {
        Ok(TemplateRef::parse(input, &self.user)?)
    }

    pub fn connect(&self) -> Result<ServiceClient> {
        Ok(ServiceClient::new(
            &self.host,
            &self.user,
            Box::new(read_password),
        )?)
    }
}

fn invoking_user() -> String {
    env::var("SUDO_USER")
        .or_else(|_| env::var("USER"))
        .unwrap_or_default()
}

fn read_password(user: &str) -> canvas::Result<String> {
    if let Ok(password) = env::var(PASSWORD_ENV) {
        return Ok(password);
    }

    let mut stderr = io::stderr();
    write!(stderr, "Password ({}): ", user)?;
    stderr.flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Dry-run listing of staged template edits, then the dry-run footer
pub(crate) fn print_dry_run(staged: &StagedChanges, action: &str, template: &str) {
    print!("{}", staged.preview(action, template));
    if !staged.is_empty() {
        println!();
    }
    println!("{}", DRY_RUN_FOOTER);
}

/// `--public` / `--enabled` style flag values
pub(crate) fn flag_value(value: Option<&str>) -> Option<bool> {
    value.and_then(parse_bool)
}

/// Print service errors and turn them into exit code 1
pub fn finish(result: Result<i32>) -> Result<i32> {
    match result {
        Ok(code) => Ok(code),
        Err(e) => match e.downcast_ref::<Error>() {
            Some(err) if err.is_service() => {
                println!("{}", err);
                Ok(1)
            }
            _ => Err(e),
        },
    }
}

/// Left-aligned table with a rule under the header
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.len());
            }
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!(" {:<width$} ", c, width = w))
            .collect::<String>()
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.to_vec());
    out.push('\n');
    let rule: usize = widths.iter().map(|w| w + 2).sum();
    out.push_str(&"-".repeat(rule));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}
