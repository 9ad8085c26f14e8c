// src/backend/dnf.rs

//! Host package manager backend
//!
//! Drives the `rpm` and `dnf` command-line tools. Template repositories are
//! written as `.repo` files into a private temporary reposdir, so a sync only
//! ever sees the repositories its template names; the host's own repository
//! configuration is consulted for `enabled_repos` only.
//!
//! Install and erase requests are queued locally. `resolve` replays them
//! through `dnf --assumeno shell` and reads the solver's transaction table
//! back, so pulled-in dependencies and unused-dependency removals are part of
//! the [`Resolution`]. `do_transaction` replays the same script for real.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::process::Command;
use std::str::FromStr;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

use super::{
    native_arch, HostPackage, MultilibPolicy, PackageBackend, QueryMatches, Resolution, Selector,
};
use crate::error::{Error, Result};
use crate::model::repository::RepoConfig;
use crate::model::wire::parse_bool;

/// `repoquery` format producing `name-epoch:version-release.arch`
const NEVRA_FORMAT: &str = "%{name}-%{epoch}:%{version}-%{release}.%{arch}\n";

/// `rpm` format for the same
const RPM_FORMAT: &str = "%{NAME}-%{EPOCHNUM}:%{VERSION}-%{RELEASE}.%{ARCH}\\n";

#[derive(Debug, Clone)]
enum Request {
    Install(String),
    Erase(String),
}

pub struct DnfBackend {
    reposdir: TempDir,
    repo_ids: Vec<String>,
    policy: MultilibPolicy,
    clean_deps: bool,
    requests: Vec<Request>,
    resolution: Option<Resolution>,
}

impl DnfBackend {
    /// Prepare an empty private reposdir and read the host's dnf settings
    pub fn new() -> Result<Self> {
        let reposdir = TempDir::new()?;
        debug!("Using private reposdir {}", reposdir.path().display());

        let (policy, clean_deps) = match run(Command::new("dnf").args(["config-manager", "--dump"]))
        {
            Ok(output) => main_settings(&parse_dump(&output)),
            Err(e) => {
                warn!("Unable to read dnf configuration, using defaults: {}", e);
                (MultilibPolicy::default(), true)
            }
        };

        Ok(Self {
            reposdir,
            repo_ids: Vec::new(),
            policy,
            clean_deps,
            requests: Vec::new(),
            resolution: None,
        })
    }

    /// A `dnf` invocation restricted to the template repositories
    fn dnf_verbose(&self) -> Command {
        let mut cmd = Command::new("dnf");
        cmd.arg(format!("--setopt=reposdir={}", self.reposdir.path().display()))
            .arg(format!(
                "--setopt=clean_requirements_on_remove={}",
                if self.clean_deps { "True" } else { "False" }
            ));
        cmd
    }

    fn dnf(&self) -> Command {
        let mut cmd = self.dnf_verbose();
        cmd.arg("--quiet");
        cmd
    }

    fn repoquery(&self, spec: &str, extra: &[&str]) -> Result<Vec<HostPackage>> {
        let mut cmd = self.dnf();
        cmd.args(["repoquery", "--latest-limit=1", "--queryformat", NEVRA_FORMAT])
            .args(extra)
            .arg(spec);
        Ok(parse_nevra_lines(&run(&mut cmd)?))
    }

    fn installed_matching(&self, spec: &str) -> Result<Vec<HostPackage>> {
        let output = Command::new("rpm")
            .args(["-q", "--queryformat", RPM_FORMAT, spec])
            .output()
            .map_err(|e| Error::Backend(format!("failed to run rpm: {}", e)))?;

        // rpm exits non-zero when nothing matches
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(parse_nevra_lines(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Shell script replaying the queued requests
    fn script(&self, finish: &str) -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        for request in &self.requests {
            match request {
                Request::Install(spec) => writeln!(file, "install {}", spec)?,
                Request::Erase(spec) => writeln!(file, "remove {}", spec)?,
            }
        }
        writeln!(file, "{}", finish)?;
        file.flush()?;
        Ok(file)
    }
}

impl PackageBackend for DnfBackend {
    fn add_repo(&mut self, repo: &RepoConfig) -> Result<()> {
        let path = self.reposdir.path().join(format!("{}.repo", repo.id));
        fs::write(&path, repo.to_ini())?;

        let mut cmd = self.dnf();
        cmd.args(["makecache", &format!("--repo={}", repo.id)]);
        run(&mut cmd).map_err(|e| Error::Repo {
            stub: repo.id.clone(),
            reason: e.to_string(),
        })?;

        info!("Loaded repository {}", repo.id);
        self.repo_ids.push(repo.id.clone());
        Ok(())
    }

    fn fill_sack(&mut self) -> Result<()> {
        debug!("Building package index from {} repositories", self.repo_ids.len());
        let mut cmd = self.dnf();
        cmd.arg("makecache");
        run(&mut cmd).map(|_| ())
    }

    fn multilib_policy(&self) -> MultilibPolicy {
        self.policy
    }

    fn clean_requirements_on_remove(&self) -> bool {
        self.clean_deps
    }

    fn best_query(&self, spec: &str) -> Result<QueryMatches> {
        let installed = self.installed_matching(spec)?;
        let available = self
            .repoquery(spec, &[])?
            .into_iter()
            .filter(|p| !installed.contains(p))
            .collect();

        Ok(QueryMatches {
            installed,
            available,
        })
    }

    fn best_selectors(&self, spec: &str) -> Result<Vec<Selector>> {
        let arches = format!("--arch=noarch,{}", native_arch());
        let mut by_arch: BTreeMap<String, Vec<HostPackage>> = BTreeMap::new();
        for package in self.repoquery(spec, &[&arches])? {
            by_arch.entry(package.arch.clone()).or_default().push(package);
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
        self.requests.push(Request::Install(package.nevra()));
    }

    fn install_selector(&mut self, selector: &Selector) {
        for package in &selector.candidates {
            self.install(package);
        }
    }

    fn erase(&mut self, package: &HostPackage, clean_deps: bool) {
        if clean_deps != self.clean_deps {
            debug!(
                "Erase of {} requested with clean_deps={}, dnf uses {}",
                package, clean_deps, self.clean_deps
            );
        }
        self.requests.push(Request::Erase(package.nevra()));
    }

    fn resolve(&mut self) -> Result<Resolution> {
        let script = self.script("run")?;

        // The transaction table is only printed without --quiet, and
        // --assumeno exits non-zero after printing it
        let mut cmd = self.dnf_verbose();
        cmd.args(["--assumeno", "shell"]).arg(script.path());
        debug!("Running {:?}", cmd);
        let output = cmd
            .output()
            .map_err(|e| Error::Solver(format!("failed to run dnf: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(problem) = solver_error(&stdout, &stderr) {
            return Err(Error::Solver(problem));
        }

        let resolution = parse_transaction(&stdout);
        debug!(
            "Solver plans {} install(s) and {} removal(s)",
            resolution.install_set.len(),
            resolution.remove_set.len()
        );
        self.resolution = Some(resolution.clone());
        Ok(resolution)
    }

    fn download_packages(&mut self, packages: &[HostPackage]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let mut cmd = self.dnf();
        cmd.args(["-y", "--downloadonly", "install"])
            .args(packages.iter().map(HostPackage::nevra));
        run(&mut cmd).map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(())
    }

    fn do_transaction(&mut self) -> Result<i32> {
        if self.resolution.take().is_none() {
            return Err(Error::Transaction(
                "transaction has not been resolved".to_string(),
            ));
        }

        let script = self.script("run")?;
        let status = self
            .dnf()
            .args(["-y", "shell"])
            .arg(script.path())
            .status()
            .map_err(|e| Error::Transaction(format!("failed to run dnf: {}", e)))?;

        self.requests.clear();
        Ok(status.code().unwrap_or(1))
    }

    fn user_installed(&self) -> Result<Vec<HostPackage>> {
        let output = run(Command::new("dnf").args([
            "repoquery",
            "--quiet",
            "--userinstalled",
            "--queryformat",
            NEVRA_FORMAT,
        ]))?;
        Ok(parse_nevra_lines(&output))
    }

    fn all_installed(&self) -> Result<Vec<HostPackage>> {
        let output = run(Command::new("rpm").args(["-qa", "--queryformat", RPM_FORMAT]))?;
        Ok(parse_nevra_lines(&output))
    }

    fn enabled_repos(&self) -> Result<Vec<RepoConfig>> {
        let listing = run(Command::new("dnf").args(["repolist", "--enabled"]))?;

        let mut repos = Vec::new();
        for id in parse_repolist(&listing) {
            let dump = run(Command::new("dnf").args(["config-manager", "--dump", &id]))?;
            repos.push(repo_config_from_dump(&id, &parse_dump(&dump)));
        }

        debug!("Found {} enabled repositories", repos.len());
        Ok(repos)
    }
}

/// Run a command to completion, returning stdout or a backend error
fn run(cmd: &mut Command) -> Result<String> {
    let program = cmd.get_program().to_string_lossy().to_string();
    debug!("Running {:?}", cmd);

    let output = cmd
        .output()
        .map_err(|e| Error::Backend(format!("failed to run {}: {}. Is it installed?", program, e)))?;

    if !output.status.success() {
        return Err(Error::Backend(format!(
            "{} failed: {}",
            program,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn parse_nevra_lines(output: &str) -> Vec<HostPackage> {
    output
        .lines()
        .filter_map(HostPackage::parse_nevra)
        .collect()
}

/// `key = value` pairs from `dnf config-manager --dump`
fn parse_dump(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter(|line| !line.starts_with('='))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Repository ids from `dnf repolist`, skipping the header
fn parse_repolist(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("repo id"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// The solver's complaint, if dnf reported one
fn solver_error(stdout: &str, stderr: &str) -> Option<String> {
    let failed = stdout
        .lines()
        .chain(stderr.lines())
        .any(|line| line.starts_with("Error:"));
    if !failed {
        return None;
    }

    let detail = stderr.trim();
    Some(if detail.is_empty() {
        stdout.trim().to_string()
    } else {
        detail.to_string()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableSection {
    Install,
    Remove,
    Other,
}

impl TableSection {
    fn from_header(header: &str) -> Self {
        let header = header.to_ascii_lowercase();
        if ["installing", "upgrading", "reinstalling", "downgrading"]
            .iter()
            .any(|verb| header.starts_with(verb))
        {
            TableSection::Install
        } else if header.starts_with("removing") {
            TableSection::Remove
        } else {
            TableSection::Other
        }
    }
}

/// Install and removal sets from the transaction table dnf prints before
/// asking for confirmation
///
/// Rows are `name arch [epoch:]version-release repo size`. A name too long
/// for its column sits alone on one line with the rest of the row on the next.
fn parse_transaction(output: &str) -> Resolution {
    let mut resolution = Resolution::default();
    let mut section: Option<TableSection> = None;
    let mut wrapped: Option<String> = None;

    for line in output.lines() {
        if line.starts_with("Transaction Summary") {
            break;
        }
        if line.trim().is_empty() || line.starts_with('=') {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            section = line
                .trim_end()
                .strip_suffix(':')
                .map(TableSection::from_header);
            wrapped = None;
            continue;
        }

        let Some(current) = section else {
            continue;
        };
        let row: Vec<&str> = line.split_whitespace().collect();
        if row.first() == Some(&"replacing") {
            continue;
        }
        if row.len() == 1 {
            wrapped = Some(row[0].to_string());
            continue;
        }

        let package = match wrapped.take() {
            Some(name) => table_row(&name, &row),
            None => row
                .split_first()
                .and_then(|(name, rest)| table_row(name, rest)),
        };
        let Some(package) = package else {
            continue;
        };

        match current {
            TableSection::Install => resolution.install_set.push(package),
            TableSection::Remove => resolution.remove_set.push(package),
            TableSection::Other => {}
        }
    }

    let mut resolution = resolution.sorted();
    resolution.install_set.dedup();
    resolution.remove_set.dedup();
    resolution
}

/// `arch [epoch:]version-release ...` following a package name
fn table_row(name: &str, rest: &[&str]) -> Option<HostPackage> {
    let [arch, evr, ..] = rest else {
        return None;
    };
    let (epoch, vr) = match evr.split_once(':') {
        Some((e, vr)) => (e.parse::<u64>().ok().filter(|e| *e > 0), vr),
        None => (None, *evr),
    };
    let (version, release) = vr.rsplit_once('-')?;
    Some(HostPackage::new(name, epoch, version, release, *arch))
}

fn main_settings(dump: &BTreeMap<String, String>) -> (MultilibPolicy, bool) {
    let policy = dump
        .get("multilib_policy")
        .and_then(|v| MultilibPolicy::from_str(v).ok())
        .unwrap_or_default();
    let clean = dump
        .get("clean_requirements_on_remove")
        .and_then(|v| parse_bool(v))
        .unwrap_or(true);
    (policy, clean)
}

fn repo_config_from_dump(id: &str, dump: &BTreeMap<String, String>) -> RepoConfig {
    let list = |key: &str| -> Vec<String> {
        dump.get(key)
            .map(|v| {
                v.split([',', ' '])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let single = |key: &str| dump.get(key).filter(|v| !v.is_empty()).cloned();

    let mut config = RepoConfig::new(id);
    config.name = single("name");
    config.baseurl = list("baseurl");
    config.mirrorlist = single("mirrorlist");
    config.metalink = single("metalink");
    config.enabled = dump.get("enabled").and_then(|v| parse_bool(v)).unwrap_or(true);
    config.cost = dump.get("cost").and_then(|v| v.parse().ok());
    config.priority = dump.get("priority").and_then(|v| v.parse().ok());
    config.gpgcheck = dump.get("gpgcheck").and_then(|v| parse_bool(v));
    config.gpgkey = list("gpgkey");
    config.excludepkgs = list("excludepkgs");
    config.metadata_expire = single("metadata_expire");
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump_and_settings() {
        let dump = parse_dump(
            "=============== main ===============\n\
             multilib_policy = all\n\
             clean_requirements_on_remove = False\n\
             installonly_limit = 3\n",
        );
        assert_eq!(dump.get("installonly_limit").map(String::as_str), Some("3"));
        assert_eq!(main_settings(&dump), (MultilibPolicy::All, false));
        assert_eq!(
            main_settings(&BTreeMap::new()),
            (MultilibPolicy::Best, true)
        );
    }

    #[test]
    fn test_parse_repolist() {
        let ids = parse_repolist(
            "repo id                 repo name\n\
             fedora                  Fedora 38 - x86_64\n\
             updates                 Fedora 38 - x86_64 - Updates\n",
        );
        assert_eq!(ids, vec!["fedora", "updates"]);
    }

    #[test]
    fn test_repo_config_from_dump() {
        let dump = parse_dump(
            "=============== repo: korora ===============\n\
             name = Korora 38\n\
             baseurl = http://a/, http://b/\n\
             enabled = 1\n\
             cost = 900\n\
             gpgcheck = 1\n\
             gpgkey = file:///etc/pki/key\n\
             metalink = \n",
        );
        let config = repo_config_from_dump("korora", &dump);
        assert_eq!(config.name.as_deref(), Some("Korora 38"));
        assert_eq!(config.baseurl, vec!["http://a/", "http://b/"]);
        assert_eq!(config.cost, Some(900));
        assert_eq!(config.gpgcheck, Some(true));
        assert!(config.metalink.is_none());
        assert!(config.enabled);
    }

    const TRANSACTION: &str = "\
Last metadata expiration check: 0:01:12 ago.
Dependencies resolved.
================================================================================
 Package                 Architecture  Version              Repository     Size
================================================================================
Installing:
 firefox                 x86_64        119.0-1.fc39         fedora         60 M
Installing dependencies:
 libfoo                  x86_64        1.0-1.fc39           fedora        100 k
 python3-a-very-long-package-name-for-the-column
                         noarch        2:3.1-4.fc39         fedora         12 k
Upgrading:
 bash                    x86_64        5.2.21-1.fc39        updates       1.8 M
     replacing  bash.x86_64 5.2.15-3.fc39
Removing:
 vim-enhanced            x86_64        2:9.0.2120-1.fc39    @fedora       3.9 M
Removing unused dependencies:
 gpm-libs                x86_64        1.20.7-44.fc39       @fedora        28 k

Transaction Summary
================================================================================
Install  3 Packages
Upgrade  1 Package
Remove   2 Packages

Operation aborted.
";

    #[test]
    fn test_parse_transaction_includes_dependencies() {
        let resolution = parse_transaction(TRANSACTION);

        let installs: Vec<&str> = resolution.install_set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            installs,
            vec![
                "bash",
                "firefox",
                "libfoo",
                "python3-a-very-long-package-name-for-the-column"
            ]
        );
        let removes: Vec<&str> = resolution.remove_set.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(removes, vec!["gpm-libs", "vim-enhanced"]);

        let wrapped = &resolution.install_set[3];
        assert_eq!(wrapped.arch, "noarch");
        assert_eq!(wrapped.epoch, Some(2));
        assert_eq!(wrapped.version, "3.1");
        assert_eq!(wrapped.release, "4.fc39");
        assert_eq!(resolution.remove_set[1].nevra(), "vim-enhanced-2:9.0.2120-1.fc39.x86_64");
    }

    #[test]
    fn test_parse_transaction_nothing_to_do() {
        let resolution = parse_transaction("Dependencies resolved.\nNothing to do.\nComplete!\n");
        assert!(resolution.is_empty());
    }

    #[test]
    fn test_solver_error() {
        assert_eq!(solver_error(TRANSACTION, ""), None);

        let stderr = "Error: \n Problem: conflicting requests\n  - nothing provides libbar\n";
        let problem = solver_error("Dependencies resolved.\n", stderr).unwrap();
        assert!(problem.contains("nothing provides libbar"));
    }

    #[test]
    fn test_parse_nevra_lines_skips_noise() {
        let packages = parse_nevra_lines("bash-0:5.2.15-3.fc38.x86_64\n\nwarning\n");
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].epoch, None);
    }
}
