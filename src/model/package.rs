// src/model/package.rs

//! Package identity
//!
//! A [`Package`] names a software package in a template. Identity is the pair
//! (name, architecture): epoch, version and release are payload, so a
//! template can never hold two entries that differ only by version.
//!
//! Packages are built from one of three sources, each through its own total
//! factory:
//!
//! - [`Package::from_string`] - compact notation `[+|~]name[#epoch]@version-release[:arch]`
//! - [`Package::from_wire`] - service payload object with short keys `n,e,v,r,a,z`
//! - [`Package::from_host_record`] - a record reported by the host package manager
//!
//! None of them fail. Fields that cannot be recovered stay `None`, so callers
//! must check [`Package::require_name`] before handing a package on.

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::wire;
use crate::backend::HostPackage;
use crate::error::{Error, Result};

/// Action bitflags attached to a package entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Action(u8);

impl Action {
    pub const INCLUDE: Action = Action(0x01);
    pub const EXCLUDE: Action = Action(0x02);
    pub const PIN: Action = Action(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Action(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Action) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Action) -> Action {
        Action(self.0 | other.0)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::INCLUDE
    }
}

/// A package entry in a template
///
/// Serializes to the service's short-key object, omitting unset fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Package {
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    #[serde(rename = "v", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "r", skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(rename = "z")]
    pub action: Action,
}

impl Package {
    /// An included package with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse the compact notation `[+|~]name[#epoch]@version-release[:arch]`
    ///
    /// A leading `~` marks the package excluded; `+` or no prefix marks it
    /// included. Every other component is optional:
    ///
    /// - `"foo"` - name only
    /// - `"~foo"` - excluded
    /// - `"foo:i686"` - name and arch
    /// - `"foo@2.0"` - name and version
    /// - `"foo#1@2.0-3:x86_64"` - everything
    pub fn from_string(input: &str) -> Self {
        let mut pkg = Package::default();
        let mut rest = input.trim();

        if let Some(stripped) = rest.strip_prefix('~') {
            pkg.action = Action::EXCLUDE;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('+') {
            rest = stripped;
        }

        if let Some((head, arch)) = rest.rsplit_once(':') {
            pkg.arch = non_empty(arch);
            rest = head;
        }

        if let Some((head, evr)) = rest.split_once('@') {
            match evr.rsplit_once('-') {
                Some((version, release)) => {
                    pkg.version = non_empty(version);
                    pkg.release = non_empty(release);
                }
                None => pkg.version = non_empty(evr),
            }
            rest = head;
        }

        if let Some((name, epoch)) = rest.split_once('#') {
            pkg.epoch = epoch.trim().parse().ok();
            rest = name;
        }

        pkg.name = non_empty(rest);
        pkg
    }

    /// Parse a service payload object (`{"n","e","v","r","a","z"}`)
    ///
    /// Anything that is not an object yields an empty package.
    pub fn from_wire(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Package::default();
        };

        Self {
            name: wire::string(obj, "n"),
            epoch: wire::unsigned(obj, "e"),
            version: wire::string(obj, "v"),
            release: wire::string(obj, "r"),
            arch: wire::string(obj, "a"),
            action: wire::unsigned(obj, "z")
                .and_then(|z| u8::try_from(z).ok())
                .map(Action::from_bits)
                .unwrap_or_default(),
        }
    }

    /// Build from a package reported by the host package manager
    pub fn from_host_record(record: &HostPackage) -> Self {
        Self {
            name: Some(record.name.clone()),
            epoch: record.epoch,
            version: Some(record.version.clone()),
            release: Some(record.release.clone()),
            arch: Some(record.arch.clone()),
            action: Action::INCLUDE,
        }
    }

    /// Drop epoch, version and release, keeping identity and action
    pub fn without_evr(mut self) -> Self {
        self.epoch = None;
        self.version = None;
        self.release = None;
        self
    }

    /// Name, or an error for entries that were parsed from unusable input
    pub fn require_name(&self) -> Result<&str> {
        self.name.as_deref().ok_or(Error::MissingField("name"))
    }

    pub fn included(&self) -> bool {
        self.action.contains(Action::INCLUDE)
    }

    pub fn excluded(&self) -> bool {
        self.action.contains(Action::EXCLUDE)
    }

    pub fn pinned(&self) -> bool {
        self.action.contains(Action::PIN)
    }

    /// Render a spec the package manager's subject parser understands:
    /// `name[-[epoch:]version[-release]][.arch]`
    ///
    /// The version is joined to the name with `-`; dnf cannot split
    /// `bash5.1-2` back into a name and a version. The epoch and the release
    /// are only emitted together with a version.
    pub fn to_spec(&self) -> String {
        let mut spec = self.name.clone().unwrap_or_default();

        if let Some(version) = &self.version {
            spec.push('-');
            if let Some(epoch) = self.epoch {
                spec.push_str(&format!("{}:", epoch));
            }
            spec.push_str(version);
            if let Some(release) = &self.release {
                spec.push('-');
                spec.push_str(release);
            }
        }

        if let Some(arch) = &self.arch {
            spec.push('.');
            spec.push_str(arch);
        }

        spec
    }

    pub fn to_object(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn identity(&self) -> (Option<&str>, Option<&str>) {
        (self.name.as_deref(), self.arch.as_deref())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.included() { '+' } else { '~' };
        write!(f, "{}{}", mark, self.name.as_deref().unwrap_or("?"))?;
        if let Some(epoch) = self.epoch {
            write!(f, "#{}", epoch)?;
        }
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
            if let Some(release) = &self.release {
                write!(f, "-{}", release)?;
            }
        }
        if let Some(arch) = &self.arch {
            write!(f, ":{}", arch)?;
        }
        Ok(())
    }
}
