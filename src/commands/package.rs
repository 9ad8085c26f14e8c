// src/commands/package.rs
//! Package commands: add, update, list, rm

use anyhow::Result;
use canvas::model::Package;
use canvas::service::{self, TemplateStore};
use canvas::sync::StagedChanges;

use super::{print_dry_run, render_table, CommandContext};

/// Add packages to a template
pub fn cmd_package_add<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    packages: &[String],
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    for spec in packages {
        let package = Package::from_string(spec);
        package.require_name()?;
        t.add_package(package);
    }

    let staged = StagedChanges {
        packages: t.packages_delta().iter().cloned().collect(),
        repos: Vec::new(),
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
    println!("info: package(s) added.");
    Ok(0)
}

/// Change the version, arch or action of packages already in a template
pub fn cmd_package_update<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    packages: &[String],
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    let mut updated = Vec::new();
    for spec in packages {
        let package = Package::from_string(spec);
        package.require_name()?;

        if !t.packages().contains(&package) {
            println!("warn: package is not defined in template: {}", spec);
            continue;
        }
        if t.update_package(package.clone()) {
            updated.push(package);
        }
    }

    let name = t.name.clone().unwrap_or_else(|| reference.name.clone());
    if ctx.dry_run {
        let staged = StagedChanges {
            packages: updated,
            repos: Vec::new(),
        };
        print_dry_run(&staged, "updated in", &name);
        return Ok(0);
    }

    if updated.is_empty() {
        println!("info: no changes detected.");
        return Ok(0);
    }

    service::update_template(store, &mut t)?;
    println!("info: package(s) updated.");
    Ok(0)
}

/// List every package of a template, inherited ones included
pub fn cmd_package_list<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let t = service::fetch_template(store, &reference)?;

    let packages = t.packages_all();
    if packages.is_empty() {
        println!("0 packages defined.");
        return Ok(0);
    }

    let dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let rows: Vec<Vec<String>> = packages
        .iter()
        .map(|p| {
            vec![
                dash(p.name.clone()),
                dash(p.epoch.map(|e| e.to_string())),
                dash(p.version.clone()),
                dash(p.release.clone()),
                dash(p.arch.clone()),
                if p.included() { "+" } else { "-" }.to_string(),
            ]
        })
        .collect();

    print!(
        "{}",
        render_table(
            &["package", "epoch", "version", "release", "arch", "action"],
            &rows
        )
    );
    println!();
    Ok(0)
}

/// Remove packages from a template
///
/// Packages inherited through an include cannot be removed here.
pub fn cmd_package_rm<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    packages: &[String],
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    let mut removed = Vec::new();
    for spec in packages {
        let package = Package::from_string(spec);
        if t.remove_package(&package) {
            removed.push(package);
        } else if t.packages_included().contains(&package) {
            println!("warn: package is inherited from an include: {}", spec);
        }
    }
    removed.sort_by(|a, b| a.name.cmp(&b.name));

    let staged = StagedChanges {
        packages: removed,
        repos: Vec::new(),
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
    println!("info: package(s) removed.");
    Ok(0)
}
