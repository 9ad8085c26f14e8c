// src/model/state.rs

//! System state capture and representation.
//!
//! This module captures the installed packages and enabled repositories of
//! the host through a [`PackageBackend`], and turns them into a `system`
//! template that can be diffed against, or merged into, a real template.

use std::collections::HashSet;

use super::package::Package;
use super::repository::{RepoConfig, Repository};
use super::template::Template;
use crate::backend::{HostPackage, PackageBackend};
use crate::error::Result;

/// Which installed packages a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageScope {
    /// Only packages the user asked for explicitly
    #[default]
    UserInstalled,
    /// Every installed package, dependencies included
    All,
}

/// Represents the current state of the system
#[derive(Debug, Clone, Default)]
pub struct SystemState {
    /// Currently installed packages
    pub installed: Vec<HostPackage>,

    /// Names of packages installed explicitly by the user
    pub explicit: HashSet<String>,

    /// Enabled repositories
    pub repos: Vec<RepoConfig>,
}

impl SystemState {
    /// Create an empty system state
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the backend for installed packages and enabled repositories
    pub fn capture<B: PackageBackend + ?Sized>(backend: &B) -> Result<Self> {
        let installed = backend.all_installed()?;
        let explicit = backend
            .user_installed()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let repos = backend.enabled_repos()?;

        Ok(Self {
            installed,
            explicit,
            repos,
        })
    }

    /// Check if a package is installed
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|p| p.name == name)
    }

    /// Check if a package was explicitly installed
    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.contains(name)
    }

    pub fn package_count(&self) -> usize {
        self.installed.len()
    }

    /// Installed packages in `scope`, as template entries without versions
    ///
    /// The architecture is dropped for names that `reference` lists without
    /// one, so a template entry `vim` lines up with the installed
    /// `vim.x86_64`.
    pub fn packages(&self, scope: PackageScope, reference: Option<&Template>) -> Vec<Package> {
        let archless: HashSet<String> = reference
            .map(|t| {
                t.packages_all()
                    .into_iter()
                    .filter(|p| p.arch.is_none())
                    .filter_map(|p| p.name)
                    .collect()
            })
            .unwrap_or_default();

        self.installed
            .iter()
            .filter(|p| scope == PackageScope::All || self.explicit.contains(&p.name))
            .map(|p| {
                let mut package = Package::from_host_record(p).without_evr();
                if archless.contains(&p.name) {
                    package.arch = None;
                }
                package
            })
            .collect()
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.repos.iter().map(Repository::from_host_record).collect()
    }

    /// A `system` template holding the snapshot as its base
    pub fn to_template(&self, scope: PackageScope, reference: Option<&Template>) -> Template {
        let mut template = Template::default();
        template.name = Some("system".to_string());
        for package in self.packages(scope, reference) {
            template.add_package(package);
        }
        for repo in self.repositories() {
            template.add_repo(repo);
        }
        template.commit_delta();
        template
    }
}
