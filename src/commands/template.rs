// src/commands/template.rs
//! Template commands: add, update, rm, list, pull, push, diff, copy, dump

use anyhow::Result;
use canvas::model::{PackageScope, SystemState, Template, TemplateDiff};
use canvas::service::{self, ListFilter, TemplateStore};
use canvas::sync::{self, SyncOptions, SyncOutcome};
use canvas::PackageBackend;
use tracing::info;

use super::{flag_value, print_dry_run, render_table, CommandContext, DRY_RUN_FOOTER};
use crate::cli::DumpFormat;

/// Metadata settable by `template add` and `template update`
#[derive(Debug, Default, Clone)]
pub struct TemplateFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub includes: Option<Vec<String>>,
    pub public: Option<String>,
}

impl TemplateFields {
    fn apply(self, template: &mut Template) {
        if let Some(title) = self.title {
            template.title = Some(title);
        }
        if let Some(description) = self.description {
            template.description = Some(description);
        }
        if let Some(includes) = self.includes {
            template.includes = includes
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(public) = flag_value(self.public.as_deref()) {
            template.set_public(public);
        }
    }
}

/// Create a template
pub fn cmd_template_add<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    fields: TemplateFields,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = Template::from_ref(&reference);
    fields.apply(&mut t);

    if ctx.dry_run {
        println!("The following template would be created: {}", reference);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    info!("Creating template {}", reference);
    service::create_template(store, &mut t)?;
    println!("info: template added.");
    Ok(0)
}

/// Change template metadata
pub fn cmd_template_update<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    fields: TemplateFields,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;
    fields.apply(&mut t);

    if ctx.dry_run {
        println!("The following template would be updated: {}", reference);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    service::update_template(store, &mut t)?;
    println!("info: template updated.");
    Ok(0)
}

/// Delete a template
pub fn cmd_template_rm<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
) -> Result<i32> {
    let reference = ctx.reference(template)?;

    if ctx.dry_run {
        println!("The following template would be removed: {}", reference);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    service::delete_template(store, &reference)?;
    println!("info: template removed.");
    Ok(0)
}

/// List templates visible to the user
pub fn cmd_template_list<S: TemplateStore + ?Sized>(
    store: &mut S,
    filter: &ListFilter,
) -> Result<i32> {
    let templates = store.list_templates(filter)?;

    if templates.is_empty() {
        println!("0 templates found.");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = templates
        .iter()
        .map(|t| vec![t.reference(), t.name.clone().unwrap_or_default()])
        .collect();
    print!("{}", render_table(&["user:name", "title"], &rows));
    println!("\n{} template(s) found.", templates.len());
    Ok(0)
}

/// Sync the host to a template
pub fn cmd_template_pull<S, B>(
    ctx: &CommandContext,
    store: &mut S,
    backend: &mut B,
    template: &str,
    clean: bool,
) -> Result<i32>
where
    S: TemplateStore + ?Sized,
    B: PackageBackend + ?Sized,
{
    let reference = ctx.reference(template)?;
    let t = service::fetch_template(store, &reference)?;

    println!("info: analysing system ...");
    let outcome = sync::sync_template(
        backend,
        &t,
        SyncOptions {
            dry_run: ctx.dry_run,
            clean,
        },
    )?;
    Ok(print_sync_outcome(&outcome))
}

/// Print a dry-run report, or pass the transaction's exit code through
pub(crate) fn print_sync_outcome(outcome: &SyncOutcome) -> i32 {
    match outcome.code {
        Some(code) => {
            info!("Sync finished with code {}", code);
            code
        }
        None => {
            print!("{}", outcome.report);
            if !outcome.report.is_empty() {
                println!();
            }
            println!("{}", DRY_RUN_FOOTER);
            0
        }
    }
}

/// Stage the host's packages and enabled repositories into a template
pub fn cmd_template_push<S, B>(
    ctx: &CommandContext,
    store: &mut S,
    backend: &B,
    template: &str,
    all: bool,
) -> Result<i32>
where
    S: TemplateStore + ?Sized,
    B: PackageBackend + ?Sized,
{
    let reference = ctx.reference(template)?;
    let mut t = service::fetch_template(store, &reference)?;

    println!("info: analysing system ...");
    let scope = if all {
        PackageScope::All
    } else {
        PackageScope::UserInstalled
    };
    let staged = sync::stage_system(&mut t, backend, scope)?;
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
    println!("info: template pushed.");
    Ok(0)
}

/// Compare a template with another template or, by default, the host
pub fn cmd_template_diff<S, B>(
    ctx: &CommandContext,
    store: &mut S,
    backend: &B,
    template_from: &str,
    template_to: Option<&str>,
) -> Result<i32>
where
    S: TemplateStore + ?Sized,
    B: PackageBackend + ?Sized,
{
    let from = ctx.reference(template_from)?;
    let left = service::fetch_template(store, &from)?;

    let (right, right_label) = match template_to {
        Some(to) => {
            let to = ctx.reference(to)?;
            (service::fetch_template(store, &to)?, to.to_string())
        }
        None => {
            println!("info: analysing system ...");
            let state = SystemState::capture(backend)?;
            (
                state.to_template(PackageScope::UserInstalled, Some(&left)),
                "system".to_string(),
            )
        }
    };

    print!(
        "{}",
        render_diff(&TemplateDiff::between(&left, &right), &from.to_string(), &right_label)
    );
    Ok(0)
}

/// Text for a diff between `left` and `right`
pub(crate) fn render_diff(diff: &TemplateDiff, left: &str, right: &str) -> String {
    let mut out = format!("In {} not in {}:\n", left, right);
    for p in &diff.packages_left {
        out.push_str(&format!(" - {}\n", p.name.as_deref().unwrap_or("?")));
    }
    out.push_str(&format!("\nOn {} not in {}:\n", right, left));
    for p in &diff.packages_right {
        out.push_str(&format!(" + {}\n", p.name.as_deref().unwrap_or("?")));
    }
    out.push('\n');

    if !diff.repos_left.is_empty() || !diff.repos_right.is_empty() {
        out.push_str("Repos:\n");
        for r in &diff.repos_left {
            out.push_str(&format!(" - {}\n", r.stub.as_deref().unwrap_or("?")));
        }
        for r in &diff.repos_right {
            out.push_str(&format!(" + {}\n", r.stub.as_deref().unwrap_or("?")));
        }
        out.push('\n');
    }
    out
}

/// Copy a template to a new `user:name`
pub fn cmd_template_copy<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template_from: &str,
    template_to: &str,
) -> Result<i32> {
    let from = ctx.reference(template_from)?;
    let to = ctx.reference(template_to)?;

    let mut t = service::fetch_template(store, &from)?;
    t.retarget(&to);

    if ctx.dry_run {
        println!("The following template would be created: {} (from {})", to, from);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    service::create_template(store, &mut t)?;
    println!("info: template copied.");
    Ok(0)
}

/// Print the stored form of a template
pub fn cmd_template_dump<S: TemplateStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    template: &str,
    format: DumpFormat,
) -> Result<i32> {
    let reference = ctx.reference(template)?;
    let t = service::fetch_template(store, &reference)?;
    let object = t.to_object();

    let text = match format {
        DumpFormat::Json => serde_json::to_string_pretty(&object)?,
        DumpFormat::Yaml => serde_yaml::to_string(&object)?,
    };
    println!("{}", text.trim_end());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas::backend::{HostPackage, MemoryBackend};
    use canvas::model::{Package, RepoConfig, TemplateRef};
    use canvas::service::MemoryStore;
    use serde_json::json;

    fn ctx(dry_run: bool) -> CommandContext {
        CommandContext {
            user: "firnsy".to_string(),
            host: "http://localhost:3000".to_string(),
            dry_run,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_template(json!({
                "stub": "base", "user": "firnsy",
                "packages": [{"n": "bash", "z": 1}],
                "repos": [{"s": "fedora"}]
            }))
            .with_template(json!({
                "stub": "desktop", "user": "firnsy", "includes": ["base"],
                "packages": [{"n": "firefox", "z": 1}]
            }))
    }

    fn host() -> MemoryBackend {
        MemoryBackend::new()
            .with_arch("x86_64")
            .with_repo_packages(
                "fedora",
                vec![HostPackage::new("firefox", None, "120.0", "1", "x86_64")],
            )
            .with_installed(HostPackage::new("bash", None, "5.2", "1", "x86_64"), true)
            .with_installed(HostPackage::new("vim", None, "9.1", "1", "x86_64"), true)
            .with_host_repo(RepoConfig::new("fedora"))
    }

    #[test]
    fn test_add_sets_metadata() {
        let mut s = MemoryStore::new();
        let fields = TemplateFields {
            title: Some("Server".to_string()),
            includes: Some(vec!["base".to_string(), " ".to_string()]),
            public: Some("1".to_string()),
            ..TemplateFields::default()
        };

        assert_eq!(cmd_template_add(&ctx(false), &mut s, "server", fields).unwrap(), 0);

        let stored = s.stored_template("firnsy", "server").unwrap();
        assert_eq!(stored["name"], "Server");
        assert_eq!(stored["includes"], json!(["base"]));
        assert_eq!(stored["meta"]["public"], true);
    }

    #[test]
    fn test_add_dry_run_writes_nothing() {
        let mut s = MemoryStore::new();
        cmd_template_add(&ctx(true), &mut s, "server", TemplateFields::default()).unwrap();
        assert_eq!(s.writes(), 0);
    }

    #[test]
    fn test_push_stages_and_updates() {
        let mut s = store();
        let b = host();

        assert_eq!(cmd_template_push(&ctx(false), &mut s, &b, "desktop", false).unwrap(), 0);
        assert_eq!(s.updates, 1);

        let reference = TemplateRef::parse("firnsy:desktop", "firnsy").unwrap();
        let t = service::fetch_template(&mut s, &reference).unwrap();
        assert_eq!(t.find_package("vim").len(), 1);
        // bash and fedora come from the include
        assert!(t.packages().iter().all(|p| p.name.as_deref() != Some("bash")));
        assert!(t.repos().is_empty());
    }

    #[test]
    fn test_push_without_changes_skips_remote() {
        let mut s = store();
        let b = MemoryBackend::new()
            .with_installed(HostPackage::new("bash", None, "5.2", "1", "x86_64"), true);

        assert_eq!(cmd_template_push(&ctx(false), &mut s, &b, "desktop", false).unwrap(), 0);
        assert_eq!(s.writes(), 0);
    }

    #[test]
    fn test_push_dry_run_writes_nothing() {
        let mut s = store();
        let b = host();
        cmd_template_push(&ctx(true), &mut s, &b, "desktop", true).unwrap();
        assert_eq!(s.writes(), 0);
    }

    #[test]
    fn test_pull_dry_run_leaves_host_alone() {
        let mut s = store();
        let mut b = host();

        assert_eq!(cmd_template_pull(&ctx(true), &mut s, &mut b, "desktop", true).unwrap(), 0);
        assert_eq!(b.calls().host_writes(), 0);
        assert!(b.is_installed("vim"));
        assert!(!b.is_installed("firefox"));
    }

    #[test]
    fn test_pull_commits() {
        let mut s = store();
        let mut b = host();

        assert_eq!(cmd_template_pull(&ctx(false), &mut s, &mut b, "desktop", true).unwrap(), 0);
        assert!(b.is_installed("firefox"));
        assert!(!b.is_installed("vim"));
        assert_eq!(s.writes(), 0);
    }

    #[test]
    fn test_copy_creates_new_template() {
        let mut s = store();
        cmd_template_copy(&ctx(false), &mut s, "desktop", "csmart:desktop").unwrap();

        let copied = s.stored_template("csmart", "desktop").unwrap();
        assert_eq!(copied["packages"], json!([{"n": "firefox", "z": 1}]));
        assert_eq!(copied["includes"], json!(["base"]));
        assert_eq!(s.creates, 1);
    }

    #[test]
    fn test_missing_template_is_service_class() {
        let mut s = MemoryStore::new();
        let err = cmd_template_rm(&ctx(false), &mut s, "nothing").unwrap_err();
        assert!(
            err.downcast_ref::<canvas::Error>()
                .is_some_and(canvas::Error::is_service)
        );
    }

    #[test]
    fn test_render_diff() {
        let mut left = Template::default();
        left.add_package(Package::new("x"));
        left.add_package(Package::new("y"));
        let mut right = Template::default();
        right.add_package(Package::new("y"));
        right.add_package(Package::new("z"));

        let text = render_diff(&TemplateDiff::between(&left, &right), "firnsy:a", "system");
        assert_eq!(
            text,
            "In firnsy:a not in system:\n - x\n\nOn system not in firnsy:a:\n + z\n\n"
        );
    }
}
