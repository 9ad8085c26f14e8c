// src/model/repository.rs

//! Repository identity and native repository configuration

use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::wire;
use crate::error::{Error, Result};

/// A repository entry in a template
///
/// Identity is the stub alone. The URL lists are independent of each other;
/// a repository may carry a baseurl and a metalink at the same time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Repository {
    #[serde(rename = "s", skip_serializing_if = "Option::is_none")]
    pub stub: Option<String>,
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "bu", skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<Vec<String>>,
    #[serde(rename = "ml", skip_serializing_if = "Option::is_none")]
    pub mirrorlist: Option<Vec<String>>,
    #[serde(rename = "ma", skip_serializing_if = "Option::is_none")]
    pub metalink: Option<Vec<String>>,
    #[serde(rename = "e", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub cost: Option<i64>,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(rename = "gc", skip_serializing_if = "Option::is_none")]
    pub gpgcheck: Option<bool>,
    #[serde(rename = "gk", skip_serializing_if = "Option::is_none")]
    pub gpgkey: Option<Vec<String>>,
    #[serde(rename = "x", skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
    #[serde(rename = "me", skip_serializing_if = "Option::is_none")]
    pub meta_expired: Option<String>,
}

impl Repository {
    /// A repository known only by its stub
    pub fn new(stub: impl Into<String>) -> Self {
        Self {
            stub: Some(stub.into()),
            ..Self::default()
        }
    }

    /// Parse the stub-only shorthand; blank input leaves the stub unset
    pub fn from_string(input: &str) -> Self {
        let stub = input.trim();
        Self {
            stub: (!stub.is_empty()).then(|| stub.to_string()),
            ..Self::default()
        }
    }

    /// Parse a service payload object
    /// (`{"s","n","bu","ml","ma","e","gc","gk","me","c","p","x"}`)
    pub fn from_wire(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Repository::default();
        };

        Self {
            stub: wire::string(obj, "s"),
            name: wire::string(obj, "n"),
            baseurl: wire::string_list(obj, "bu"),
            mirrorlist: wire::string_list(obj, "ml"),
            metalink: wire::string_list(obj, "ma"),
            enabled: wire::boolean(obj, "e"),
            cost: wire::integer(obj, "c"),
            priority: wire::integer(obj, "p"),
            gpgcheck: wire::boolean(obj, "gc"),
            gpgkey: wire::string_list(obj, "gk"),
            exclude: wire::string_list(obj, "x"),
            meta_expired: wire::string(obj, "me"),
        }
    }

    /// Build from a repository configured on the host
    pub fn from_host_record(config: &RepoConfig) -> Self {
        let list = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        let single = |v: &Option<String>| v.as_ref().map(|s| vec![s.clone()]);

        Self {
            stub: Some(config.id.clone()),
            name: config.name.clone(),
            baseurl: list(&config.baseurl),
            mirrorlist: single(&config.mirrorlist),
            metalink: single(&config.metalink),
            enabled: Some(config.enabled),
            cost: config.cost,
            priority: config.priority,
            gpgcheck: config.gpgcheck,
            gpgkey: list(&config.gpgkey),
            exclude: list(&config.excludepkgs),
            meta_expired: config.metadata_expire.clone(),
        }
    }

    pub fn require_stub(&self) -> Result<&str> {
        self.stub.as_deref().ok_or(Error::MissingField("stub"))
    }

    /// Overlay every field set on `other` onto this entry; identity is kept
    pub fn merge_from(&mut self, other: &Repository) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field.clone(); })*
            };
        }
        take!(
            name, baseurl, mirrorlist, metalink, enabled, cost, priority, gpgcheck, gpgkey,
            exclude, meta_expired
        );
    }

    /// Build a configuration the package manager can load
    ///
    /// Only fields set on the entry are applied. Package managers treat a
    /// repository as enabled unless told otherwise, so `enabled == Some(false)`
    /// is carried over as an explicit disable.
    pub fn to_repo_config(&self) -> Result<RepoConfig> {
        let mut config = RepoConfig::new(self.require_stub()?);

        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(baseurl) = &self.baseurl {
            config.baseurl = baseurl.clone();
        }
        if let Some(mirrorlist) = self.mirrorlist.as_ref().and_then(|v| v.first()) {
            config.mirrorlist = Some(mirrorlist.clone());
        }
        if let Some(metalink) = self.metalink.as_ref().and_then(|v| v.first()) {
            config.metalink = Some(metalink.clone());
        }
        if self.enabled == Some(false) {
            config.enabled = false;
        }
        if let Some(cost) = self.cost {
            config.cost = Some(cost);
        }
        if let Some(priority) = self.priority {
            config.priority = Some(priority);
        }
        if let Some(gpgcheck) = self.gpgcheck {
            config.gpgcheck = Some(gpgcheck);
        }
        if let Some(gpgkey) = &self.gpgkey {
            config.gpgkey = gpgkey.clone();
        }
        if let Some(exclude) = &self.exclude {
            config.excludepkgs = exclude.clone();
        }
        if let Some(expire) = &self.meta_expired {
            config.metadata_expire = Some(expire.clone());
        }

        Ok(config)
    }

    /// Serialize for the wire, emitting only fields that are set
    pub fn to_object(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.stub == other.stub
    }
}

impl Eq for Repository {}

impl Hash for Repository {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stub.hash(state);
    }
}

impl Ord for Repository {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stub.cmp(&other.stub)
    }
}

impl PartialOrd for Repository {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stub.as_deref().unwrap_or("?"))?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Repository configuration as the package manager understands it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub id: String,
    pub name: Option<String>,
    pub baseurl: Vec<String>,
    pub mirrorlist: Option<String>,
    pub metalink: Option<String>,
    pub enabled: bool,
    pub cost: Option<i64>,
    pub priority: Option<i64>,
    pub gpgcheck: Option<bool>,
    pub gpgkey: Vec<String>,
    pub excludepkgs: Vec<String>,
    pub metadata_expire: Option<String>,
}

impl RepoConfig {
    /// An enabled repository with no sources
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            baseurl: Vec::new(),
            mirrorlist: None,
            metalink: None,
            enabled: true,
            cost: None,
            priority: None,
            gpgcheck: None,
            gpgkey: Vec::new(),
            excludepkgs: Vec::new(),
            metadata_expire: None,
        }
    }

    /// Render as a `.repo` file section
    pub fn to_ini(&self) -> String {
        let mut out = format!("[{}]\n", self.id);
        let mut line = |key: &str, value: String| out.push_str(&format!("{}={}\n", key, value));

        line("name", self.name.clone().unwrap_or_else(|| self.id.clone()));
        if !self.baseurl.is_empty() {
            line("baseurl", self.baseurl.join(" "));
        }
        if let Some(mirrorlist) = &self.mirrorlist {
            line("mirrorlist", mirrorlist.clone());
        }
        if let Some(metalink) = &self.metalink {
            line("metalink", metalink.clone());
        }
        line("enabled", u8::from(self.enabled).to_string());
        if let Some(cost) = self.cost {
            line("cost", cost.to_string());
        }
        if let Some(priority) = self.priority {
            line("priority", priority.to_string());
        }
        if let Some(gpgcheck) = self.gpgcheck {
            line("gpgcheck", u8::from(gpgcheck).to_string());
        }
        if !self.gpgkey.is_empty() {
            line("gpgkey", self.gpgkey.join(" "));
        }
        if !self.excludepkgs.is_empty() {
            line("excludepkgs", self.excludepkgs.join(","));
        }
        if let Some(expire) = &self.metadata_expire {
            line("metadata_expire", expire.clone());
        }

        out
    }
}
