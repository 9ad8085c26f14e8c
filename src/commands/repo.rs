// src/commands/repo.rs
//! Repository commands: add, update, list, rm

use anyhow::Result;
use canvas::model::Repository;
use canvas::service::{self, TemplateStore};
use canvas::sync::StagedChanges;
use tracing::debug;

use super::{flag_value, print_dry_run, render_table, CommandContext};
use crate::cli::RepoOptions;

/// A repository entry carrying only the options given on the command line
fn repository_from_options(stub: &str, options: &RepoOptions) -> Repository {
    Repository {
        name: options.name.clone(),
        baseurl: options.baseurl.clone(),
        mirrorlist: options.mirrorlist.clone(),
        metalink: options.metalink.clone(),
        enabled: flag_value(options.enabled.as_deref()),
        cost: options.cost,
        priority: options.priority,
        gpgcheck: flag_value(options.gpgcheck.as_deref()),
        gpgkey: options.gpgkey.clone(),
        exclude: options.exclude.clone(),
        ..Repository::from_string(stub)
    }
}

/// Add a repository to a template
pub fn cmd_repo_add<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    repo: &str,
    options: &RepoOptions,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    let entry = repository_from_options(repo, options);
    entry.require_stub()?;
    t.add_repo(entry);

    let staged = StagedChanges {
        packages: Vec::new(),
        repos: t.repos_delta().iter().cloned().collect(),
    };
    let name = t.name.clone().unwrap_or_else(|| reference.name.clone());

    if ctx.dry_run {
        print_dry_run(&staged, "added to", &name);
        return Ok(0);
    }

    if staged.is_empty() {
        println!("info: no changes detected, template up to date.");
        return Ok(0);
    }

    service::update_template(store, &mut t)?;
    println!("info: repo added.");
    Ok(0)
}

/// Overlay the given options on a repository already in a template
pub fn cmd_repo_update<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    repo: &str,
    options: &RepoOptions,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    let changes = repository_from_options(repo, options);
    changes.require_stub()?;

    let Some(mut entry) = t.owned_repo(&changes).cloned() else {
        println!("warn: repo is not defined in template: {}", repo);
        return Ok(0);
    };
    entry.merge_from(&changes);
    debug!("Updating repo {}", entry);

    let name = t.name.clone().unwrap_or_else(|| reference.name.clone());
    if ctx.dry_run {
        let staged = StagedChanges {
            packages: Vec::new(),
            repos: vec![entry],
        };
        print_dry_run(&staged, "updated in", &name);
        return Ok(0);
    }

    if !t.update_repo(entry) {
        println!("info: no changes detected.");
        return Ok(0);
    }

    service::update_template(store, &mut t)?;
    println!("info: repo updated.");
    Ok(0)
}

/// List every repository of a template, inherited ones included
pub fn cmd_repo_list<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let t = service::fetch_template(store, &reference)?;

    let repos = t.repos_all();
    if repos.is_empty() {
        println!("0 repos defined.");
        return Ok(0);
    }

    let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let rows: Vec<Vec<String>> = repos
        .iter()
        .map(|r| {
            vec![
                show(r.stub.clone()),
                show(r.name.clone()),
                show(r.priority.map(|p| p.to_string())),
                show(r.cost.map(|c| c.to_string())),
                show(r.enabled.map(|e| e.to_string())),
            ]
        })
        .collect();

    print!(
        "{}",
        render_table(&["repo", "name", "priority", "cost", "enabled"], &rows)
    );
    println!();
    Ok(0)
}

/// Remove repositories from a template
pub fn cmd_repo_rm<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    repos: &[String],
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    let mut removed = Vec::new();
    for stub in repos {
        let repo = Repository::from_string(stub);
        if t.remove_repo(&repo) {
            removed.push(repo);
        } else if t.repos_included().contains(&repo) {
            println!("warn: repo is inherited from an include: {}", stub);
        }
    }
    removed.sort();

    let staged = StagedChanges {
        packages: Vec::new(),
        repos: removed,
    };
    let name = t.name.clone().unwrap_or_else(|| reference.name.clone());

    if ctx.dry_run {
        print_dry_run(&staged, "removed from", &name);
        return Ok(0);
    }

    if staged.is_empty() {
        println!("info: no changes detected, template up to date.");
        return Ok(0);
    }

    service::update_template(store, &mut t)?;
    println!("info: repo(s) removed.");
    Ok(0)
}
