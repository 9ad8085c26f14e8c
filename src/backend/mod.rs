// src/backend/mod.rs

//! Package manager backends
//!
//! The reconciliation engine never talks to `dnf` directly. It drives a
//! [`PackageBackend`]: load repositories, build the package index, queue
//! install/erase requests, resolve, download and commit. Two implementations
//! ship with the crate:
//!
//! - [`dnf::DnfBackend`] - the host package manager via the `rpm`/`dnf` tools
//! - [`memory::MemoryBackend`] - an in-memory package set that records every
//!   mutating call
//!
//! Version comparison and candidate ranking are left to the backend; the
//! engine only decides what to ask for.

pub mod dnf;
pub mod memory;

use std::env;
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::Result;
use crate::model::repository::RepoConfig;

pub use dnf::DnfBackend;
pub use memory::MemoryBackend;

/// Architectures recognised as the suffix of a package spec
pub const KNOWN_ARCHES: &[&str] = &[
    "noarch", "x86_64", "i686", "i586", "i386", "aarch64", "armv7hl", "ppc64le", "ppc64",
    "s390x", "riscv64", "src",
];

/// The machine architecture in package-manager spelling
pub fn native_arch() -> String {
    match env::consts::ARCH {
        "x86" => "i686".to_string(),
        "arm" => "armv7hl".to_string(),
        "powerpc64" => "ppc64le".to_string(),
        other => other.to_string(),
    }
}

/// True when the last `.`-separated component of `spec` is an architecture
pub fn spec_has_arch(spec: &str) -> bool {
    spec.rsplit_once('.')
        .is_some_and(|(_, arch)| KNOWN_ARCHES.contains(&arch))
}

/// How architecture-ambiguous names are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum MultilibPolicy {
    /// Install every architecture that matches
    All,
    /// Install only the best architecture for the host
    #[default]
    Best,
}

/// A package as known to the host package manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPackage {
    pub name: String,
    pub epoch: Option<u64>,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl HostPackage {
    pub fn new(
        name: impl Into<String>,
        epoch: Option<u64>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    /// Parse `name-[epoch:]version-release.arch`
    pub fn parse_nevra(input: &str) -> Option<Self> {
        let input = input.trim();
        let (rest, arch) = input.rsplit_once('.')?;
        let (rest, release) = rest.rsplit_once('-')?;
        let (name, evr) = rest.rsplit_once('-')?;

        let (epoch, version) = match evr.split_once(':') {
            Some((e, v)) => (e.parse().ok(), v),
            None => (None, evr),
        };

        if name.is_empty() || version.is_empty() || release.is_empty() || arch.is_empty() {
            return None;
        }

        Some(Self::new(name, epoch.filter(|e| *e > 0), version, release, arch))
    }

    /// `name-[epoch:]version-release.arch`
    pub fn nevra(&self) -> String {
        match self.epoch {
            Some(epoch) if epoch > 0 => format!(
                "{}-{}:{}-{}.{}",
                self.name, epoch, self.version, self.release, self.arch
            ),
            _ => format!(
                "{}-{}-{}.{}",
                self.name, self.version, self.release, self.arch
            ),
        }
    }

    /// Match a package spec the way the package manager's subject parser does:
    /// `name`, `name.arch`, `name-version`, `name-version-release` and
    /// `name-[epoch:]version-release.arch`
    pub fn matches_spec(&self, spec: &str) -> bool {
        let evr_forms = [
            self.version.clone(),
            format!("{}-{}", self.version, self.release),
        ];

        if spec == self.name || spec == format!("{}.{}", self.name, self.arch) {
            return true;
        }

        let epoch = self.epoch.unwrap_or(0);
        evr_forms.iter().any(|evr| {
            let plain = format!("{}-{}", self.name, evr);
            let with_epoch = format!("{}-{}:{}", self.name, epoch, evr);
            [plain, with_epoch]
                .iter()
                .any(|base| spec == base.as_str() || spec == format!("{}.{}", base, self.arch))
        })
    }
}

impl fmt::Display for HostPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nevra())
    }
}

/// Installed and installable packages matching a spec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMatches {
    pub installed: Vec<HostPackage>,
    pub available: Vec<HostPackage>,
}

impl QueryMatches {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.available.is_empty()
    }
}

/// A ranked candidate set for one architecture of a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub spec: String,
    pub candidates: Vec<HostPackage>,
}

impl Selector {
    pub fn matches(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Concrete outcome of resolving the queued requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub install_set: Vec<HostPackage>,
    pub remove_set: Vec<HostPackage>,
}

impl Resolution {
    /// Sort both sets by name for display
    pub fn sorted(mut self) -> Self {
        self.install_set.sort_by(|a, b| a.name.cmp(&b.name));
        self.remove_set.sort_by(|a, b| a.name.cmp(&b.name));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.install_set.is_empty() && self.remove_set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.install_set.len() + self.remove_set.len()
    }
}

/// The package-management transaction contract
///
/// Requests (`install`, `install_selector`, `erase`) only queue work; nothing
/// changes on the host before `do_transaction`.
pub trait PackageBackend {
    /// Add a repository and load its metadata; fails if it cannot be loaded
    fn add_repo(&mut self, repo: &RepoConfig) -> Result<()>;

    /// Build the package index from the loaded repos and host metadata
    fn fill_sack(&mut self) -> Result<()>;

    fn multilib_policy(&self) -> MultilibPolicy;

    fn clean_requirements_on_remove(&self) -> bool;

    fn is_arch_specified(&self, spec: &str) -> bool {
        spec_has_arch(spec)
    }

    /// All packages matching `spec`, split into installed and available
    fn best_query(&self, spec: &str) -> Result<QueryMatches>;

    /// One selector per candidate architecture, ranked by the backend
    fn best_selectors(&self, spec: &str) -> Result<Vec<Selector>>;

    fn install(&mut self, package: &HostPackage);

    fn install_selector(&mut self, selector: &Selector);

    fn erase(&mut self, package: &HostPackage, clean_deps: bool);

    /// Run the solver over the queued requests
    fn resolve(&mut self) -> Result<Resolution>;

    fn download_packages(&mut self, packages: &[HostPackage]) -> Result<()>;

    /// Execute the resolved transaction, returning its exit code
    fn do_transaction(&mut self) -> Result<i32>;

    /// Packages installed explicitly by the user
    fn user_installed(&self) -> Result<Vec<HostPackage>>;

    fn all_installed(&self) -> Result<Vec<HostPackage>>;

    /// Enabled repositories from the host configuration
    fn enabled_repos(&self) -> Result<Vec<RepoConfig>>;
}
