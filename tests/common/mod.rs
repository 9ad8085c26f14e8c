// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use canvas::backend::{HostPackage, MemoryBackend};
use canvas::model::{RepoConfig, TemplateRef};
use canvas::service::{self, MemoryStore};
use canvas::Template;
use serde_json::json;

pub const USER: &str = "firnsy";

/// A released x86_64 package
pub fn host(name: &str, version: &str) -> HostPackage {
    HostPackage::new(name, None, version, "1.fc39", "x86_64")
}

/// A store holding `firnsy:base` and `firnsy:desktop`, which includes base.
///
/// base: bash, fedora
/// desktop: firefox, ~sendmail
pub fn store() -> MemoryStore {
    MemoryStore::new()
        .with_template(json!({
            "stub": "base", "user": USER, "name": "Base",
            "packages": [{"n": "bash", "z": 1}],
            "repos": [{"s": "fedora", "n": "Fedora", "e": true}]
        }))
        .with_template(json!({
            "stub": "desktop", "user": USER, "name": "Desktop",
            "includes": ["base"],
            "packages": [{"n": "firefox", "z": 1}, {"n": "sendmail", "z": 2}]
        }))
}

/// A host with fedora configured, vim and sendmail installed by the user
pub fn backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_arch("x86_64")
        .with_repo_packages(
            "fedora",
            vec![
                host("bash", "5.2.15"),
                host("firefox", "119.0"),
                host("vim", "9.0.2"),
            ],
        )
        .with_installed(host("vim", "9.0.2"), true)
        .with_installed(host("sendmail", "8.17.1"), true)
        .with_host_repo(RepoConfig::new("fedora"))
}

pub fn fetch(store: &mut MemoryStore, reference: &str) -> Template {
    let reference = TemplateRef::parse(reference, USER).unwrap();
    service::fetch_template(store, &reference).unwrap()
}
