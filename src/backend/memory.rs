// src/backend/memory.rs

//! In-memory package manager
//!
//! Holds a fixed catalog per repository and an installed set. Queries follow
//! the same spec grammar as the host tools; ranking is "last listed wins" per
//! name and architecture, so callers control what counts as newest by the
//! order they register packages in.
//!
//! Every mutating call is counted in [`CallLog`], which is how the dry-run
//! guarantees are tested.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{
    native_arch, HostPackage, MultilibPolicy, PackageBackend, QueryMatches, Resolution, Selector,
};
use crate::error::{Error, Result};
use crate::model::repository::RepoConfig;

/// Calls made against the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub repos_added: Vec<String>,
    pub install_requests: usize,
    pub erase_requests: usize,
    pub resolves: usize,
    pub downloads: Vec<HostPackage>,
    pub commits: usize,
}

impl CallLog {
    /// Calls that change the host: downloads and commits
    pub fn host_writes(&self) -> usize {
        self.downloads.len() + self.commits
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    catalog: BTreeMap<String, Vec<HostPackage>>,
    broken_repos: BTreeSet<String>,
    loaded_repos: BTreeSet<String>,
    installed: Vec<HostPackage>,
    user_installed: BTreeSet<String>,
    host_repos: Vec<RepoConfig>,
    policy: MultilibPolicy,
    clean_deps: bool,
    arch: String,
    solver_error: Option<String>,
    stale_cache: bool,
    installs: Vec<HostPackage>,
    erases: Vec<HostPackage>,
    resolution: Option<Resolution>,
    calls: CallLog,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            catalog: BTreeMap::new(),
            broken_repos: BTreeSet::new(),
            loaded_repos: BTreeSet::new(),
            installed: Vec::new(),
            user_installed: BTreeSet::new(),
            host_repos: Vec::new(),
            policy: MultilibPolicy::Best,
            clean_deps: true,
            arch: native_arch(),
            solver_error: None,
            stale_cache: false,
            installs: Vec::new(),
            erases: Vec::new(),
            resolution: None,
            calls: CallLog::default(),
        }
    }

    /// Make `packages` available from repository `stub` once it is added
    pub fn with_repo_packages(mut self, stub: &str, packages: Vec<HostPackage>) -> Self {
        self.catalog
            .entry(stub.to_string())
            .or_default()
            .extend(packages);
        self
    }

    /// A repository whose metadata cannot be loaded
    pub fn with_broken_repo(mut self, stub: &str) -> Self {
        self.broken_repos.insert(stub.to_string());
        self
    }

    /// Mark `package` installed; `user` marks it as explicitly requested
    pub fn with_installed(mut self, package: HostPackage, user: bool) -> Self {
        if user {
            self.user_installed.insert(package.name.clone());
        }
        self.installed.push(package);
        self
    }

    /// A repository configured on the host
    pub fn with_host_repo(mut self, repo: RepoConfig) -> Self {
        self.host_repos.push(repo);
        self
    }

    pub fn with_policy(mut self, policy: MultilibPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clean_deps(mut self, clean: bool) -> Self {
        self.clean_deps = clean;
        self
    }

    pub fn with_arch(mut self, arch: &str) -> Self {
        self.arch = arch.to_string();
        self
    }

    /// Make `resolve` fail with `reason`
    pub fn with_solver_error(mut self, reason: &str) -> Self {
        self.solver_error = Some(reason.to_string());
        self
    }

    /// Make `fill_sack` fail the way a stale cache does
    pub fn with_stale_cache(mut self) -> Self {
        self.stale_cache = true;
        self
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    pub fn installed(&self) -> &[HostPackage] {
        &self.installed
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|p| p.name == name)
    }

    fn is_installed_exact(&self, package: &HostPackage) -> bool {
        self.installed.contains(package)
    }

    /// Newest candidate per (name, arch) across loaded repositories
    fn candidates(&self, spec: &str) -> Vec<HostPackage> {
        let mut best: BTreeMap<(String, String), HostPackage> = BTreeMap::new();

        for stub in &self.loaded_repos {
            for package in self.catalog.get(stub).into_iter().flatten() {
                if package.matches_spec(spec) {
                    best.insert(
                        (package.name.clone(), package.arch.clone()),
                        package.clone(),
                    );
                }
            }
        }

        best.into_values().collect()
    }

    fn arch_compatible(&self, arch: &str) -> bool {
        arch == "noarch" || arch == self.arch
    }
}

impl PackageBackend for MemoryBackend {
    fn add_repo(&mut self, repo: &RepoConfig) -> Result<()> {
        self.calls.repos_added.push(repo.id.clone());

        if self.broken_repos.contains(&repo.id) {
            return Err(Error::Repo {
                stub: repo.id.clone(),
                reason: "cannot download repomd.xml".to_string(),
            });
        }

        if repo.enabled {
            self.loaded_repos.insert(repo.id.clone());
        }
        Ok(())
    }

    fn fill_sack(&mut self) -> Result<()> {
        if self.stale_cache {
            return Err(Error::Backend("cache is stale".to_string()));
        }
        Ok(())
    }

    fn multilib_policy(&self) -> MultilibPolicy {
        self.policy
    }

    fn clean_requirements_on_remove(&self) -> bool {
        self.clean_deps
    }

    fn best_query(&self, spec: &str) -> Result<QueryMatches> {
        let installed: Vec<HostPackage> = self
            .installed
            .iter()
            .filter(|p| p.matches_spec(spec))
            .cloned()
            .collect();

        let available = self
            .candidates(spec)
            .into_iter()
            .filter(|p| !self.is_installed_exact(p))
            .collect();

        Ok(QueryMatches {
            installed,
            available,
        })
    }

    fn best_selectors(&self, spec: &str) -> Result<Vec<Selector>> {
        let mut by_arch: BTreeMap<String, Vec<HostPackage>> = BTreeMap::new();
        for package in self.candidates(spec) {
            if self.arch_compatible(&package.arch) {
                by_arch.entry(package.arch.clone()).or_default().push(package);
            }
        }

        if by_arch.is_empty() {
            return Ok(vec![Selector {
                spec: spec.to_string(),
                candidates: Vec::new(),
            }]);
        }

        Ok(by_arch
            .into_iter()
            .map(|(arch, candidates)| Selector {
                spec: format!("{}.{}", spec, arch),
                candidates,
            })
            .collect())
    }

    fn install(&mut self, package: &HostPackage) {
        debug!("Queue install {}", package);
        self.calls.install_requests += 1;
        self.installs.push(package.clone());
    }

    fn install_selector(&mut self, selector: &Selector) {
        self.calls.install_requests += 1;
        self.installs.extend(selector.candidates.iter().cloned());
    }

    fn erase(&mut self, package: &HostPackage, _clean_deps: bool) {
        debug!("Queue erase {}", package);
        self.calls.erase_requests += 1;
        self.erases.push(package.clone());
    }

    fn resolve(&mut self) -> Result<Resolution> {
        self.calls.resolves += 1;

        if let Some(reason) = &self.solver_error {
            return Err(Error::Solver(reason.clone()));
        }

        let install_set: BTreeSet<HostPackage> = self
            .installs
            .iter()
            .filter(|p| !self.is_installed_exact(p))
            .cloned()
            .collect();
        let remove_set: BTreeSet<HostPackage> = self.erases.iter().cloned().collect();

        let resolution = Resolution {
            install_set: install_set.into_iter().collect(),
            remove_set: remove_set.into_iter().collect(),
        }
        .sorted();

        self.resolution = Some(resolution.clone());
        Ok(resolution)
    }

    fn download_packages(&mut self, packages: &[HostPackage]) -> Result<()> {
        self.calls.downloads.extend(packages.iter().cloned());
        Ok(())
    }

    fn do_transaction(&mut self) -> Result<i32> {
        let resolution = self
            .resolution
            .take()
            .ok_or_else(|| Error::Transaction("transaction has not been resolved".to_string()))?;

        self.calls.commits += 1;

        self.installed
            .retain(|p| !resolution.remove_set.contains(p));
        for package in &resolution.remove_set {
            self.user_installed.remove(&package.name);
        }
        for package in resolution.install_set {
            self.user_installed.insert(package.name.clone());
            self.installed.retain(|p| !(p.name == package.name && p.arch == package.arch));
            self.installed.push(package);
        }

        self.installs.clear();
        self.erases.clear();
        Ok(0)
    }

    fn user_installed(&self) -> Result<Vec<HostPackage>> {
        Ok(self
            .installed
            .iter()
            .filter(|p| self.user_installed.contains(&p.name))
            .cloned()
            .collect())
    }

    fn all_installed(&self) -> Result<Vec<HostPackage>> {
        Ok(self.installed.clone())
    }

    fn enabled_repos(&self) -> Result<Vec<RepoConfig>> {
        Ok(self
            .host_repos
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str, arch: &str) -> HostPackage {
        HostPackage::new(name, None, version, "1", arch)
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_arch("x86_64")
            .with_repo_packages(
                "fedora",
                vec![
                    pkg("vim", "9.0", "x86_64"),
                    pkg("vim", "9.1", "x86_64"),
                    pkg("glibc", "2.37", "x86_64"),
                    pkg("glibc", "2.37", "i686"),
                ],
            )
            .with_installed(pkg("bash", "5.2", "x86_64"), true)
    }

    #[test]
    fn test_queries_need_loaded_repo() {
        let mut b = backend();
        assert!(b.best_query("vim").unwrap().available.is_empty());

        b.add_repo(&RepoConfig::new("fedora")).unwrap();
        let q = b.best_query("vim").unwrap();
        assert_eq!(q.available.len(), 1);
        assert_eq!(q.available[0].version, "9.1");
    }

    #[test]
    fn test_broken_repo_fails_to_load() {
        let mut b = backend().with_broken_repo("updates");
        assert!(matches!(
            b.add_repo(&RepoConfig::new("updates")),
            Err(Error::Repo { .. })
        ));
    }

    #[test]
    fn test_selectors_follow_native_arch() {
        let mut b = backend();
        b.add_repo(&RepoConfig::new("fedora")).unwrap();

        let selectors = b.best_selectors("glibc").unwrap();
        assert_eq!(selectors.len(), 1);
        assert_eq!(selectors[0].candidates[0].arch, "x86_64");

        let selectors = b.best_selectors("missing").unwrap();
        assert!(!selectors[0].matches());
    }

    #[test]
    fn test_commit_applies_resolution() {
        let mut b = backend();
        b.add_repo(&RepoConfig::new("fedora")).unwrap();

        let vim = b.best_query("vim").unwrap().available[0].clone();
        b.install(&vim);
        let bash = pkg("bash", "5.2", "x86_64");
        b.erase(&bash, true);

        let r = b.resolve().unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(b.calls().host_writes(), 0);

        assert_eq!(b.do_transaction().unwrap(), 0);
        assert!(b.is_installed("vim"));
        assert!(!b.is_installed("bash"));
        assert_eq!(b.calls().commits, 1);
    }

    #[test]
    fn test_commit_without_resolve_fails() {
        let mut b = backend();
        assert!(matches!(b.do_transaction(), Err(Error::Transaction(_))));
    }
}
