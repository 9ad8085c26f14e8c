// tests/template_sync.rs

//! Template round trips through the store and onto a host.

mod common;

use canvas::model::{Package, PackageScope, SystemState, TemplateDiff};
use canvas::service;
use canvas::sync::{self, SyncOptions};
use canvas::Template;
use common::{backend, fetch, store};

#[test]
fn test_pull_follows_includes() {
    let mut s = store();
    let mut b = backend();
    let t = fetch(&mut s, "desktop");

    let outcome = sync::sync_template(&mut b, &t, SyncOptions::default()).unwrap();

    assert_eq!(outcome.code, Some(0));
    assert!(b.is_installed("bash"));
    assert!(b.is_installed("firefox"));
    assert!(!b.is_installed("sendmail"));
    // not named by the template and no clean requested
    assert!(b.is_installed("vim"));
    assert_eq!(s.writes(), 0);
}

#[test]
fn test_pull_clean_removes_unlisted() {
    let mut s = store();
    let mut b = backend();
    let t = fetch(&mut s, "desktop");

    let options = SyncOptions {
        dry_run: false,
        clean: true,
    };
    sync::sync_template(&mut b, &t, options).unwrap();

    assert!(!b.is_installed("vim"));
    assert!(b.is_installed("firefox"));
}

#[test]
fn test_dry_run_writes_nowhere() {
    let mut s = store();
    let mut b = backend();
    let t = fetch(&mut s, "desktop");

    let options = SyncOptions {
        dry_run: true,
        clean: true,
    };
    let outcome = sync::sync_template(&mut b, &t, options).unwrap();

    assert!(outcome.code.is_none());
    let installs: Vec<&str> = outcome.report.install.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(installs, vec!["bash", "firefox"]);
    assert_eq!(outcome.report.remove.len(), 2);

    assert_eq!(b.calls().host_writes(), 0);
    assert!(b.is_installed("sendmail"));
    assert_eq!(s.writes(), 0);
}

#[test]
fn test_push_then_diff_is_clean() {
    let mut s = store();
    let b = backend();
    let mut t = fetch(&mut s, "desktop");

    let staged = sync::stage_system(&mut t, &b, PackageScope::UserInstalled).unwrap();
    assert_eq!(staged.packages.len(), 1);
    assert!(staged.repos.is_empty());
    service::update_template(&mut s, &mut t).unwrap();
    assert_eq!(s.updates, 1);

    let stored = fetch(&mut s, "desktop");
    assert_eq!(stored.find_package("vim").len(), 1);

    // bash and firefox have not been pulled yet
    let system = SystemState::capture(&b)
        .unwrap()
        .to_template(PackageScope::UserInstalled, Some(&stored));
    let diff = TemplateDiff::between(&stored, &system);
    let left: Vec<_> = diff.packages_left.iter().filter_map(|p| p.name.as_deref()).collect();
    let right: Vec<_> = diff.packages_right.iter().filter_map(|p| p.name.as_deref()).collect();
    assert!(left.contains(&"bash"));
    assert!(left.contains(&"firefox"));
    assert!(right.is_empty());
}

#[test]
fn test_second_push_stages_nothing() {
    let mut s = store();
    let b = backend();

    let mut t = fetch(&mut s, "desktop");
    sync::stage_system(&mut t, &b, PackageScope::UserInstalled).unwrap();
    service::update_template(&mut s, &mut t).unwrap();

    let mut again = fetch(&mut s, "desktop");
    let staged = sync::stage_system(&mut again, &b, PackageScope::UserInstalled).unwrap();
    assert!(staged.is_empty());
    assert_eq!(s.updates, 1);
}

#[test]
fn test_diff_between_templates() {
    let mut left = Template::default();
    left.add_package(Package::new("x"));
    left.add_package(Package::new("y"));
    let mut right = Template::default();
    right.add_package(Package::new("y"));
    right.add_package(Package::new("z"));

    let diff = TemplateDiff::between(&left, &right);
    assert_eq!(diff.packages_left, vec![Package::new("x")]);
    assert_eq!(diff.packages_right, vec![Package::new("z")]);
}

#[test]
fn test_included_packages_are_read_only() {
    let mut s = store();
    let mut t = fetch(&mut s, "desktop");

    assert!(!t.remove_package(&Package::new("bash")));
    assert!(!t.add_package(Package::new("bash")));
    assert!(t.delta_is_empty());

    let names: Vec<_> = t
        .packages_all()
        .into_iter()
        .filter_map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["bash", "firefox", "sendmail"]);
}

#[test]
fn test_copy_to_another_user() {
    let mut s = store();
    let mut t = fetch(&mut s, "desktop");

    let target = canvas::TemplateRef::parse("csmart:desktop", common::USER).unwrap();
    t.retarget(&target);
    service::create_template(&mut s, &mut t).unwrap();

    let copied = fetch(&mut s, "csmart:desktop");
    assert_eq!(copied.packages(), fetch(&mut s, "desktop").packages());
    assert_ne!(copied.uuid, fetch(&mut s, "desktop").uuid);
}
