// src/sync.rs

//! Reconciliation engine
//!
//! Brings the host in line with a template (pull, machine sync) and stages
//! the host into a template (push).
//!
//! # Sync lifecycle
//!
//! ```text
//! ANALYZE -> RESOLVE -> DRY_RUN_REPORT -> DONE
//!                    \-> COMMIT ---------/
//! ```
//!
//! Any error moves the engine to `Aborted`. Nothing on the host changes
//! before `commit`, and a dry run never reaches it.

use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::backend::{HostPackage, MultilibPolicy, PackageBackend, Resolution};
use crate::error::{Error, Result};
use crate::model::{Package, PackageScope, Repository, SystemState, Template};

/// Sync state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Waiting to load repositories and queue requests
    Analyze,
    /// Requests queued, waiting for the solver
    Resolve,
    /// Resolved for a dry run; only reporting is possible
    DryRunReport,
    /// Resolved for a real run; waiting to download and execute
    Commit,
    /// Finished
    Done,
    /// Stopped on an error; no partial commit was made
    Aborted,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Analyze => "analyze",
            Self::Resolve => "resolve",
            Self::DryRunReport => "dry-run report",
            Self::Commit => "commit",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would change without touching the host
    pub dry_run: bool,
    /// Also remove user-installed packages the template does not name
    pub clean: bool,
}

/// Changes the solver settled on, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub install: Vec<HostPackage>,
    pub remove: Vec<HostPackage>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.install.len() + self.remove.len()
    }
}

impl From<Resolution> for SyncReport {
    fn from(resolution: Resolution) -> Self {
        let resolution = resolution.sorted();
        Self {
            install: resolution.install_set,
            remove: resolution.remove_set,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No system changes required.");
        }

        writeln!(
            f,
            "The following would be installed to (+) and removed from (-) the system:"
        )?;
        for p in &self.install {
            writeln!(f, "  + {}", p)?;
        }
        for p in &self.remove {
            writeln!(f, "  - {}", p)?;
        }
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "  - Package(s): {}", self.len())?;
        Ok(())
    }
}

/// Drives one sync of a template against a backend
pub struct SyncEngine<'a, B: PackageBackend + ?Sized> {
    backend: &'a mut B,
    options: SyncOptions,
    state: SyncState,
    report: Option<SyncReport>,
}

impl<'a, B: PackageBackend + ?Sized> SyncEngine<'a, B> {
    pub fn new(backend: &'a mut B, options: SyncOptions) -> Self {
        Self {
            backend,
            options,
            state: SyncState::Analyze,
            report: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn expect_state(&self, expected: SyncState) -> Result<()> {
        if self.state != expected {
            return Err(Error::Transaction(format!(
                "sync is in state '{}', expected '{}'",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn abort<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = SyncState::Aborted;
        }
        result
    }

    /// Load the template repositories and queue install/erase requests
    pub fn analyze(&mut self, template: &Template) -> Result<()> {
        self.expect_state(SyncState::Analyze)?;
        let result = self.queue_requests(template);
        self.abort(result)?;
        self.state = SyncState::Resolve;
        Ok(())
    }

    fn queue_requests(&mut self, template: &Template) -> Result<()> {
        info!("Analysing system against {}", template);

        for repo in template.repos_all() {
            let config = repo.to_repo_config()?;
            self.backend.add_repo(&config)?;
        }

        // a stale cache leaves the index usable
        if let Err(e) = self.backend.fill_sack() {
            warn!("Unable to refresh package index: {}", e);
        }

        let policy = self.backend.multilib_policy();
        let clean_deps = self.backend.clean_requirements_on_remove();
        debug!("multilib_policy={}, clean_deps={}", policy, clean_deps);

        let packages = template.packages_all();
        for package in &packages {
            if package.name.is_none() {
                warn!("Skipping package entry without a name");
                continue;
            }
            let spec = package.to_spec();

            if package.included() {
                self.queue_install(&spec, policy)?;
            } else {
                let matches = self.backend.best_query(&spec)?;
                for installed in &matches.installed {
                    self.backend.erase(installed, clean_deps);
                }
            }
        }

        if self.options.clean {
            let wanted: HashSet<&str> = packages
                .iter()
                .filter(|p| p.included())
                .filter_map(|p| p.name.as_deref())
                .collect();

            for installed in self.backend.user_installed()? {
                if !wanted.contains(installed.name.as_str()) {
                    debug!("Clean removes {}", installed);
                    self.backend.erase(&installed, clean_deps);
                }
            }
        }

        Ok(())
    }

    fn queue_install(&mut self, spec: &str, policy: MultilibPolicy) -> Result<()> {
        if policy == MultilibPolicy::All || self.backend.is_arch_specified(spec) {
            let matches = self.backend.best_query(spec)?;
            if matches.is_empty() {
                debug!("No match for {}", spec);
                return Ok(());
            }
            for available in &matches.available {
                self.backend.install(available);
            }
            return Ok(());
        }

        let selectors = self.backend.best_selectors(spec)?;
        for selector in selectors.iter().filter(|s| s.matches()) {
            self.backend.install_selector(selector);
        }
        Ok(())
    }

    /// Run the solver over the queued requests
    pub fn resolve(&mut self) -> Result<&SyncReport> {
        self.expect_state(SyncState::Resolve)?;
        let resolution = self.backend.resolve();
        let resolution = self.abort(resolution)?;

        self.state = if self.options.dry_run {
            SyncState::DryRunReport
        } else {
            SyncState::Commit
        };

        Ok(&*self.report.insert(SyncReport::from(resolution)))
    }

    /// The resolved changes; safe to call any number of times
    pub fn report(&self) -> Result<SyncReport> {
        self.report
            .clone()
            .ok_or_else(|| Error::Transaction("sync has not been resolved".to_string()))
    }

    /// Download and execute the resolved transaction
    pub fn commit(&mut self) -> Result<i32> {
        self.expect_state(SyncState::Commit)?;
        let install = self.report()?.install;

        let result = self
            .backend
            .download_packages(&install)
            .and_then(|()| self.backend.do_transaction());
        let code = self.abort(result)?;

        info!("Transaction finished with code {}", code);
        self.state = SyncState::Done;
        Ok(code)
    }

    /// Close a dry run
    pub fn finish(&mut self) -> Result<()> {
        self.expect_state(SyncState::DryRunReport)?;
        self.state = SyncState::Done;
        Ok(())
    }
}

/// Outcome of a full sync
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// Transaction exit code; `None` for a dry run
    pub code: Option<i32>,
}

/// Analyze, resolve, then either report or commit
pub fn sync_template<B: PackageBackend + ?Sized>(
    backend: &mut B,
    template: &Template,
    options: SyncOptions,
) -> Result<SyncOutcome> {
    let mut engine = SyncEngine::new(backend, options);
    engine.analyze(template)?;
    let report = engine.resolve()?.clone();

    if options.dry_run {
        engine.finish()?;
        return Ok(SyncOutcome { report, code: None });
    }

    let code = engine.commit()?;
    Ok(SyncOutcome {
        report,
        code: Some(code),
    })
}

/// Host entries newly added to a template's delta by [`stage_system`]
#[derive(Debug, Clone, Default)]
pub struct StagedChanges {
    pub packages: Vec<Package>,
    pub repos: Vec<Repository>,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.repos.is_empty()
    }

    /// Dry-run listing, e.g. `preview("added to", "desktop")`
    pub fn preview(&self, action: &str, template: &str) -> String {
        if self.is_empty() {
            return "No template changes required.\n".to_string();
        }

        let mut out = format!("The following would be {} the template: {}\n", action, template);
        for p in &self.packages {
            out.push_str(&format!("  - {}\n", p));
        }
        for r in &self.repos {
            out.push_str(&format!("  - {}\n", r));
        }
        out.push_str("\nSummary:\n");
        if !self.packages.is_empty() {
            out.push_str(&format!("  - Package(s): {}\n", self.packages.len()));
        }
        if !self.repos.is_empty() {
            out.push_str(&format!("  - Repo(s): {}\n", self.repos.len()));
        }
        out
    }
}

/// Add the host's packages and enabled repositories to `template`
///
/// Entries are staged with `add_package`/`add_repo`, so only those the
/// template does not already have land in the delta. Versions are not kept.
pub fn stage_system<B: PackageBackend + ?Sized>(
    template: &mut Template,
    backend: &B,
    scope: PackageScope,
) -> Result<StagedChanges> {
    let state = SystemState::capture(backend)?;

    for package in state.packages(scope, Some(template)) {
        template.add_package(package);
    }
    for repo in state.repositories() {
        template.add_repo(repo);
    }

    let mut packages: Vec<Package> = template.packages_delta().iter().cloned().collect();
    packages.sort_by(|a, b| a.name.cmp(&b.name));
    let repos: Vec<Repository> = template.repos_delta().iter().cloned().collect();

    debug!(
        "Staged {} package(s) and {} repo(s)",
        packages.len(),
        repos.len()
    );
    Ok(StagedChanges { packages, repos })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::model::RepoConfig;

    fn host(name: &str, version: &str, arch: &str) -> HostPackage {
        HostPackage::new(name, None, version, "1", arch)
    }

    fn template(packages: &[&str], repos: &[&str]) -> Template {
        let mut t = Template::default();
        t.name = Some("desktop".to_string());
        for p in packages {
            t.add_package(Package::from_string(p));
        }
        for r in repos {
            t.add_repo(Repository::new(*r));
        }
        t
    }

    fn backend() -> MemoryBackend {
        MemoryBackend::new()
            .with_arch("x86_64")
            .with_repo_packages(
                "fedora",
                vec![
                    host("vim", "9.1", "x86_64"),
                    host("glibc", "2.37", "x86_64"),
                    host("glibc", "2.37", "i686"),
                    host("fonts", "1.0", "noarch"),
                ],
            )
            .with_installed(host("sendmail", "8.17", "x86_64"), true)
            .with_installed(host("bash", "5.2", "x86_64"), true)
    }

    #[test]
    fn test_dry_run_makes_no_host_writes() {
        let mut b = backend();
        let t = template(&["vim", "~sendmail", "fonts"], &["fedora"]);

        let outcome = sync_template(
            &mut b,
            &t,
            SyncOptions {
                dry_run: true,
                clean: false,
            },
        )
        .unwrap();

        assert_eq!(outcome.code, None);
        assert_eq!(outcome.report.install.len(), 2);
        assert_eq!(outcome.report.remove.len(), 1);
        assert_eq!(b.calls().host_writes(), 0);
        assert!(b.is_installed("sendmail"));
    }

    #[test]
    fn test_report_is_repeatable() {
        let mut b = backend();
        let t = template(&["vim"], &["fedora"]);
        let mut engine = SyncEngine::new(
            &mut b,
            SyncOptions {
                dry_run: true,
                clean: false,
            },
        );
        engine.analyze(&t).unwrap();
        engine.resolve().unwrap();

        let first = engine.report().unwrap();
        let second = engine.report().unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.state(), SyncState::DryRunReport);
        assert!(engine.commit().is_err());
        engine.finish().unwrap();
        assert_eq!(engine.state(), SyncState::Done);
    }

    #[test]
    fn test_commit_applies_changes() {
        let mut b = backend();
        let t = template(&["vim", "~sendmail"], &["fedora"]);

        let outcome = sync_template(&mut b, &t, SyncOptions::default()).unwrap();
        assert_eq!(outcome.code, Some(0));
        assert!(b.is_installed("vim"));
        assert!(!b.is_installed("sendmail"));
        assert_eq!(b.calls().commits, 1);
        assert_eq!(b.calls().downloads.len(), 1);
    }

    #[test]
    fn test_broken_repo_aborts_before_requests() {
        let mut b = backend().with_broken_repo("updates");
        let t = template(&["vim"], &["fedora", "updates"]);

        let mut engine = SyncEngine::new(&mut b, SyncOptions::default());
        let err = engine.analyze(&t).unwrap_err();
        assert!(matches!(err, Error::Repo { ref stub, .. } if stub == "updates"));
        assert_eq!(engine.state(), SyncState::Aborted);
        assert_eq!(b.calls().install_requests, 0);
        assert_eq!(b.calls().host_writes(), 0);
    }

    #[test]
    fn test_stale_cache_is_tolerated() {
        let mut b = backend().with_stale_cache();
        let t = template(&["vim"], &["fedora"]);
        let outcome = sync_template(&mut b, &t, SyncOptions::default()).unwrap();
        assert_eq!(outcome.report.install.len(), 1);
    }

    #[test]
    fn test_solver_error_is_fatal() {
        let mut b = backend().with_solver_error("nothing provides libfoo");
        let t = template(&["vim"], &["fedora"]);

        let mut engine = SyncEngine::new(&mut b, SyncOptions::default());
        engine.analyze(&t).unwrap();
        assert!(matches!(engine.resolve(), Err(Error::Solver(_))));
        assert_eq!(engine.state(), SyncState::Aborted);
        assert!(engine.commit().is_err());
        assert_eq!(b.calls().commits, 0);
    }

    #[test]
    fn test_multilib_best_installs_native_only() {
        let mut b = backend();
        let t = template(&["glibc"], &["fedora"]);
        let outcome = sync_template(
            &mut b,
            &t,
            SyncOptions {
                dry_run: true,
                clean: false,
            },
        )
        .unwrap();
        assert_eq!(outcome.report.install, vec![host("glibc", "2.37", "x86_64")]);
    }

    #[test]
    fn test_multilib_all_installs_every_arch() {
        let mut b = backend().with_policy(MultilibPolicy::All);
        let t = template(&["glibc"], &["fedora"]);
        let outcome = sync_template(
            &mut b,
            &t,
            SyncOptions {
                dry_run: true,
                clean: false,
            },
        )
        .unwrap();
        assert_eq!(outcome.report.install.len(), 2);
    }

    #[test]
    fn test_arch_specified_bypasses_selectors() {
        let mut b = backend();
        let t = template(&["glibc:i686"], &["fedora"]);
        let outcome = sync_template(
            &mut b,
            &t,
            SyncOptions {
                dry_run: true,
                clean: false,
            },
        )
        .unwrap();
        assert_eq!(outcome.report.install, vec![host("glibc", "2.37", "i686")]);
    }

    #[test]
    fn test_clean_removes_unlisted_user_packages() {
        let mut b = backend();
        let t = template(&["vim", "bash"], &["fedora"]);
        let outcome = sync_template(
            &mut b,
            &t,
            SyncOptions {
                dry_run: true,
                clean: true,
            },
        )
        .unwrap();
        let removed: Vec<&str> = outcome.report.remove.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(removed, vec!["sendmail"]);
    }

    #[test]
    fn test_report_text() {
        let report = SyncReport {
            install: vec![host("vim", "9.1", "x86_64")],
            remove: vec![],
        };
        let text = report.to_string();
        assert!(text.contains("  + vim-9.1-1.x86_64"));
        assert!(text.contains("  - Package(s): 1"));
        assert_eq!(
            SyncReport::default().to_string(),
            "No system changes required.\n"
        );
    }

    #[test]
    fn test_stage_system_only_adds_new_entries() {
        let b = backend()
            .with_host_repo(RepoConfig::new("fedora"))
            .with_host_repo(RepoConfig::new("updates"));
        let mut t = template(&["bash"], &["fedora"]);
        t.commit_delta();

        let staged = stage_system(&mut t, &b, PackageScope::UserInstalled).unwrap();
        assert_eq!(staged.packages.len(), 1);
        assert_eq!(staged.packages[0].name.as_deref(), Some("sendmail"));
        assert!(staged.packages[0].version.is_none());
        assert_eq!(staged.repos, vec![Repository::new("updates")]);
    }

    #[test]
    fn test_stage_system_empty_delta() {
        let b = backend();
        let mut t = template(&["bash", "sendmail"], &[]);
        t.commit_delta();

        let staged = stage_system(&mut t, &b, PackageScope::UserInstalled).unwrap();
        assert!(staged.is_empty());
        assert!(t.delta_is_empty());
    }

    #[test]
    fn test_staged_preview() {
        let staged = StagedChanges {
            packages: vec![Package::new("vim")],
            repos: vec![Repository::new("updates")],
        };
        let text = staged.preview("added to", "desktop");
        assert!(text.starts_with("The following would be added to the template: desktop\n"));
        assert!(text.contains("  - +vim\n"));
        assert!(text.contains("  - updates\n"));
        assert!(text.contains("  - Package(s): 1\n  - Repo(s): 1\n"));

        assert_eq!(
            StagedChanges::default().preview("added to", "desktop"),
            "No template changes required.\n"
        );
    }
}
