// src/commands/machine.rs
//! Machine commands: add, update, rm, list, diff, sync, cmd
//!
//! A registered machine's uuid and signing key live in the `machine`
//! section of the local configuration. `diff` and `sync` use them to fetch
//! the bound template through the signed sync endpoint.

use anyhow::Result;
use canvas::model::{Machine, PackageScope, SystemState, TemplateDiff};
use canvas::service::{self, ListFilter, MachineStore, TemplateStore};
use canvas::sync::{self, SyncOptions};
use canvas::{Config, Error, PackageBackend, Template};
use tracing::info;

use super::template::{print_sync_outcome, render_diff};
use super::{render_table, CommandContext, DRY_RUN_FOOTER};

const MACHINE_SECTION: &str = "machine";

/// Metadata settable by `machine add` and `machine update`
#[derive(Debug, Default, Clone)]
pub struct MachineFields {
    pub template: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Register this host as a machine bound to a template
pub fn cmd_machine_add<S>(
    ctx: &CommandContext,
    store: &mut S,
    config: &mut Config,
    machine: &str,
    fields: MachineFields,
) -> Result<i32>
where
    S: TemplateStore + MachineStore + ?Sized,
{
    let reference = ctx.reference(machine)?;
    let template = fields
        .template
        .as_deref()
        .ok_or(Error::MissingField("template"))?;
    let template = ctx.reference(template)?;

    let t = service::fetch_template(store, &template)?;
    let mut m = Machine::from_ref(&reference);
    m.template = t.uuid.clone();
    m.title = fields.title;
    m.description = fields.description;

    if ctx.dry_run {
        println!(
            "The following machine would be created: {} (template: {})",
            reference, template
        );
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    info!("Registering machine {} against {}", reference, template);
    let credentials = service::create_machine(store, &m)?;
    config.set(MACHINE_SECTION, "uuid", credentials.uuid);
    config.set(MACHINE_SECTION, "key", credentials.key);
    config.save()?;

    println!("info: machine added.");
    Ok(0)
}

/// Change machine metadata or rebind it to another template
pub fn cmd_machine_update<S>(
    ctx: &CommandContext,
    store: &mut S,
    machine: &str,
    fields: MachineFields,
) -> Result<i32>
where
    S: TemplateStore + MachineStore + ?Sized,
{
    let reference = ctx.reference(machine)?;
    let mut m = service::fetch_machine(store, &reference)?;

    if let Some(template) = fields.template.as_deref() {
        let template = ctx.reference(template)?;
        let t = service::fetch_template(store, &template)?;
        m.template = t.uuid;
    }
    if let Some(title) = fields.title {
        m.title = Some(title);
    }
    if let Some(description) = fields.description {
        m.description = Some(description);
    }

    if ctx.dry_run {
        println!("The following machine would be updated: {}", reference);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    service::update_machine(store, &m)?;
    println!("info: machine updated.");
    Ok(0)
}

/// Delete a machine and forget its local credentials
pub fn cmd_machine_rm<S: MachineStore + ?Sized>(
    ctx: &CommandContext,
    store: &mut S,
    config: &mut Config,
    machine: &str,
) -> Result<i32> {
    let reference = ctx.reference(machine)?;

    if ctx.dry_run {
        println!("The following machine would be removed: {}", reference);
        println!("{}", DRY_RUN_FOOTER);
        return Ok(0);
    }

    service::delete_machine(store, &reference)?;

    let forgot_uuid = config.unset(MACHINE_SECTION, "uuid");
    let forgot_key = config.unset(MACHINE_SECTION, "key");
    if forgot_uuid || forgot_key {
        config.save()?;
    }

    println!("info: machine removed.");
    Ok(0)
}

pub fn cmd_machine_list<S: MachineStore + ?Sized>(
    store: &mut S,
    filter: &ListFilter,
) -> Result<i32> {
    let machines = store.list_machines(filter)?;

    if machines.is_empty() {
        println!("0 machines found.");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = machines
        .iter()
        .map(|m| vec![m.reference(), m.name.clone().unwrap_or_default()])
        .collect();
    print!("{}", render_table(&["user:name", "title"], &rows));
    println!("\n{} machine(s) found.", machines.len());
    Ok(0)
}

/// Compare the machine's template against the host
pub fn cmd_machine_diff<S, B>(
    store: &mut S,
    backend: &B,
    config: &Config,
    machine: &str,
) -> Result<i32>
where
    S: MachineStore + ?Sized,
    B: PackageBackend + ?Sized,
{
    let template = bound_template(store, config, machine)?;

    println!("info: analysing system ...");
    let state = SystemState::capture(backend)?;
    let system = state.to_template(PackageScope::UserInstalled, Some(&template));

    print!(
        "{}",
        render_diff(&TemplateDiff::between(&template, &system), "template", "system")
    );
    Ok(0)
}

/// Sync the host to the machine's template
pub fn cmd_machine_sync<S, B>(
    ctx: &CommandContext,
    store: &mut S,
    backend: &mut B,
    config: &Config,
    machine: &str,
) -> Result<i32>
where
    S: MachineStore + ?Sized,
    B: PackageBackend + ?Sized,
{
    let template = bound_template(store, config, machine)?;

    println!("info: analysing system ...");
    let outcome = sync::sync_template(
        backend,
        &template,
        SyncOptions {
            dry_run: ctx.dry_run,
            clean: false,
        },
    )?;
    Ok(print_sync_outcome(&outcome))
}

/// Remote command execution is not offered by the service
pub fn cmd_machine_cmd(machine: &str, cmd: &str, _args: &[String]) -> Result<i32> {
    Err(Error::Unsupported(format!("machine cmd ({} on {})", cmd, machine)).into())
}

fn bound_template<S: MachineStore + ?Sized>(
    store: &mut S,
    config: &Config,
    machine: &str,
) -> Result<Template> {
    let (Some(uuid), Some(key)) = (
        config.get(MACHINE_SECTION, "uuid"),
        config.get(MACHINE_SECTION, "key"),
    ) else {
        return Err(Error::Config(format!(
            "machine {} is not registered on this host",
            machine
        ))
        .into());
    };

    Ok(service::fetch_machine_template(store, uuid, key)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas::backend::{HostPackage, MemoryBackend};
    use canvas::model::{RepoConfig, TemplateRef};
    use canvas::service::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

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
                "stub": "desktop", "user": "firnsy",
                "packages": [{"n": "firefox", "z": 1}, {"n": "vim", "z": 1}],
                "repos": [{"s": "fedora"}]
            }))
            .with_template(json!({"stub": "server", "user": "firnsy"}))
    }

    fn config(dir: &TempDir) -> Config {
        Config::load_from(&dir.path().join("canvas.toml")).unwrap()
    }

    fn add_fields(template: &str) -> MachineFields {
        MachineFields {
            template: Some(template.to_string()),
            title: Some("Laptop".to_string()),
            ..MachineFields::default()
        }
    }

    fn register(s: &mut MemoryStore, config: &mut Config) {
        cmd_machine_add(&ctx(false), s, config, "laptop", add_fields("desktop")).unwrap();
    }

    #[test]
    fn test_add_persists_credentials() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        register(&mut s, &mut c);

        assert_eq!(s.creates, 1);
        let reloaded = Config::load_from(&dir.path().join("canvas.toml")).unwrap();
        assert!(reloaded.get("machine", "uuid").is_some());
        assert!(reloaded.get("machine", "key").is_some());

        let reference = TemplateRef::parse("laptop", "firnsy").unwrap();
        let m = service::fetch_machine(&mut s, &reference).unwrap();
        assert_eq!(m.title.as_deref(), Some("Laptop"));
        assert!(m.template.is_some());
    }

    #[test]
    fn test_add_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        cmd_machine_add(&ctx(true), &mut s, &mut c, "laptop", add_fields("desktop")).unwrap();

        assert_eq!(s.writes(), 0);
        assert!(c.get("machine", "uuid").is_none());
        assert!(!dir.path().join("canvas.toml").exists());
    }

    #[test]
    fn test_add_unknown_template_is_service_error() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        let err =
            cmd_machine_add(&ctx(false), &mut s, &mut c, "laptop", add_fields("nope")).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some_and(Error::is_service));
    }

    #[test]
    fn test_update_rebinds_template() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        register(&mut s, &mut c);

        let reference = TemplateRef::parse("laptop", "firnsy").unwrap();
        let before = service::fetch_machine(&mut s, &reference).unwrap().template;

        let fields = MachineFields {
            template: Some("server".to_string()),
            ..MachineFields::default()
        };
        cmd_machine_update(&ctx(false), &mut s, "laptop", fields).unwrap();

        let after = service::fetch_machine(&mut s, &reference).unwrap();
        assert_ne!(after.template, before);
        assert_eq!(after.title.as_deref(), Some("Laptop"));
    }

    #[test]
    fn test_rm_forgets_credentials() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        register(&mut s, &mut c);

        cmd_machine_rm(&ctx(false), &mut s, &mut c, "laptop").unwrap();
        assert_eq!(s.deletes, 1);
        assert!(c.get("machine", "uuid").is_none());

        let reloaded = Config::load_from(&dir.path().join("canvas.toml")).unwrap();
        assert!(reloaded.get("machine", "key").is_none());
    }

    #[test]
    fn test_sync_installs_bound_template() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let mut c = config(&dir);
        register(&mut s, &mut c);

        let mut backend = MemoryBackend::new()
            .with_arch("x86_64")
            .with_repo_packages(
                "fedora",
                vec![
                    HostPackage::new("firefox", None, "119.0", "1.fc39", "x86_64"),
                    HostPackage::new("vim", None, "9.0", "1.fc39", "x86_64"),
                ],
            )
            .with_host_repo(RepoConfig::new("fedora"));
        let code = cmd_machine_sync(&ctx(false), &mut s, &mut backend, &c, "laptop").unwrap();

        assert_eq!(code, 0);
        assert!(backend.is_installed("firefox"));
        assert!(backend.is_installed("vim"));
    }

    #[test]
    fn test_unregistered_host_is_config_error() {
        let dir = TempDir::new().unwrap();
        let mut s = store();
        let c = config(&dir);
        let backend = MemoryBackend::new();

        let err = cmd_machine_diff(&mut s, &backend, &c, "laptop").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
    }

    #[test]
    fn test_cmd_is_unsupported() {
        let err = cmd_machine_cmd("laptop", "reboot", &[]).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Unsupported(_))));
    }
}
