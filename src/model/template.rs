// src/model/template.rs

//! Template aggregate
//!
//! A template owns its packages and repositories in three disjoint tiers:
//!
//! - **base** - entries stored on the service for this template
//! - **included** - entries contributed by included templates; read-only here,
//!   never a target of local add/remove/update
//! - **delta** - entries staged locally during this session and not yet
//!   confirmed by the service
//!
//! The views are derived on demand: `packages()` is base ∪ delta (what this
//! template owns and what gets written back), `packages_all()` is
//! base ∪ included ∪ delta (the desired state of a machine).

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use super::package::Package;
use super::repository::Repository;
use super::wire;
use crate::error::{Error, Result};

/// A `user:name` reference to a template or machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub user: String,
    pub name: String,
}

impl TemplateRef {
    /// Parse `name` or `user:name`, filling in `default_user` when absent
    pub fn parse(input: &str, default_user: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        let (user, name) = match parts.as_slice() {
            [name] => (default_user, *name),
            [user, name] => (*user, *name),
            _ => return Err(Error::InvalidReference(input.to_string())),
        };

        if user.is_empty() || name.is_empty() {
            return Err(Error::InvalidReference(input.to_string()));
        }

        Ok(Self {
            user: user.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.name)
    }
}

/// One entry kind split over the base / included / delta tiers
#[derive(Debug, Clone)]
struct Tiers<T: Ord + Clone> {
    base: BTreeSet<T>,
    included: BTreeSet<T>,
    delta: BTreeSet<T>,
}

impl<T: Ord + Clone> Default for Tiers<T> {
    fn default() -> Self {
        Self {
            base: BTreeSet::new(),
            included: BTreeSet::new(),
            delta: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> Tiers<T> {
    fn contains(&self, item: &T) -> bool {
        self.base.contains(item) || self.included.contains(item) || self.delta.contains(item)
    }

    fn owned(&self) -> BTreeSet<T> {
        self.base.union(&self.delta).cloned().collect()
    }

    fn all(&self) -> BTreeSet<T> {
        let mut all = self.owned();
        all.extend(self.included.iter().cloned());
        all
    }

    fn add(&mut self, item: T) -> bool {
        if self.contains(&item) {
            return false;
        }
        self.delta.insert(item)
    }

    fn remove(&mut self, item: &T) -> bool {
        self.delta.remove(item) || self.base.remove(item)
    }

    /// Swap the identity-equal entry for `item`, in whichever owned tier
    /// holds it
    fn update(&mut self, item: T) -> bool {
        for tier in [&mut self.delta, &mut self.base] {
            if tier.remove(&item) {
                tier.insert(item);
                return true;
            }
        }
        false
    }

    fn get_owned(&self, item: &T) -> Option<&T> {
        self.delta.get(item).or_else(|| self.base.get(item))
    }

    fn commit(&mut self) {
        let delta = std::mem::take(&mut self.delta);
        self.base.extend(delta);
    }
}

/// A named, owned manifest of desired repositories and packages
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub uuid: Option<String>,
    /// Stub; unique per user
    pub name: Option<String>,
    pub user: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Raw include references (`user:name`) as stored on the service
    pub includes: Vec<String>,
    pub meta: Map<String, Value>,
    pub stores: Vec<Value>,
    pub archives: Vec<Value>,
    /// Snapshots of the included templates as resolved by the service
    resolved_includes: Vec<Template>,
    packages: Tiers<Package>,
    repos: Tiers<Repository>,
}

impl Template {
    /// An empty template for a reference
    pub fn from_ref(reference: &TemplateRef) -> Self {
        Self {
            name: Some(reference.name.clone()),
            user: Some(reference.user.clone()),
            ..Self::default()
        }
    }

    /// Hydrate from a service payload and flatten its resolved includes
    ///
    /// The service resolves transitive includes and returns them as a flat
    /// `includes_resolved` list, so only one level is folded here.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let mut template = Self::snapshot_from_wire(value)?;

        if let Some(resolved) = value.get("includes_resolved").and_then(Value::as_array) {
            for entry in resolved {
                template.add_resolved_include(Self::snapshot_from_wire(entry)?);
            }
        }

        Ok(template)
    }

    /// Parse a single payload without looking at its resolved includes
    fn snapshot_from_wire(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| Error::TypeMismatch {
            expected: "template object",
            found: json_kind(value).to_string(),
        })?;

        // `stub` is the short name; when it is present `name` is the title
        let (name, title) = match wire::string(obj, "stub") {
            Some(stub) => (Some(stub), wire::string(obj, "name")),
            None => (wire::string(obj, "name"), wire::string(obj, "title")),
        };

        let mut template = Self {
            uuid: wire::string(obj, "uuid").or_else(|| wire::string(obj, "id")),
            name,
            user: wire::string(obj, "user")
                .or_else(|| wire::string(obj, "username"))
                .or_else(|| wire::string(obj, "owner")),
            title,
            description: wire::string(obj, "description"),
            includes: wire::string_list(obj, "includes").unwrap_or_default(),
            meta: obj
                .get("meta")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            stores: array(obj, "stores"),
            archives: array(obj, "archives"),
            ..Self::default()
        };

        template.packages.base = array(obj, "packages")
            .iter()
            .map(Package::from_wire)
            .filter(|p| p.name.is_some())
            .collect();
        template.repos.base = array(obj, "repos")
            .iter()
            .map(Repository::from_wire)
            .filter(|r| r.stub.is_some())
            .collect();

        Ok(template)
    }

    /// Fold an included template snapshot into the included tier
    pub fn add_resolved_include(&mut self, include: Template) {
        self.packages.included.extend(include.packages_all());
        self.repos.included.extend(include.repos_all());
        self.resolved_includes.push(include);
    }

    pub fn resolved_includes(&self) -> &[Template] {
        &self.resolved_includes
    }

    /// `user:name`, when both are known
    pub fn reference(&self) -> Option<TemplateRef> {
        Some(TemplateRef {
            user: self.user.clone()?,
            name: self.name.clone()?,
        })
    }

    pub fn is_public(&self) -> bool {
        self.meta
            .get("public")
            .and_then(wire::flag)
            .unwrap_or(false)
    }

    pub fn set_public(&mut self, public: bool) {
        self.meta.insert("public".to_string(), Value::Bool(public));
    }

    // ---------------------------------------------------------------------
    // Packages
    // ---------------------------------------------------------------------

    /// Base ∪ delta
    pub fn packages(&self) -> BTreeSet<Package> {
        self.packages.owned()
    }

    /// Base ∪ included ∪ delta
    pub fn packages_all(&self) -> BTreeSet<Package> {
        self.packages.all()
    }

    pub fn packages_delta(&self) -> &BTreeSet<Package> {
        &self.packages.delta
    }

    pub fn packages_included(&self) -> &BTreeSet<Package> {
        &self.packages.included
    }

    /// Stage a package; no-op when it is already present in any tier
    pub fn add_package(&mut self, package: Package) -> bool {
        self.packages.add(package)
    }

    /// Remove from delta, else from base. Entries that only come from an
    /// include cannot be removed here.
    pub fn remove_package(&mut self, package: &Package) -> bool {
        self.packages.remove(package)
    }

    /// Replace the identity-equal entry in delta or base with `package`
    pub fn update_package(&mut self, package: Package) -> bool {
        self.packages.update(package)
    }

    /// All entries named `name`, whatever their architecture
    pub fn find_package(&self, name: &str) -> Vec<Package> {
        self.packages
            .all()
            .into_iter()
            .filter(|p| p.name.as_deref() == Some(name))
            .collect()
    }

    /// The owned (base or delta) entry identity-equal to `package`
    pub fn owned_package(&self, package: &Package) -> Option<&Package> {
        self.packages.get_owned(package)
    }

    // ---------------------------------------------------------------------
    // Repositories
    // ---------------------------------------------------------------------

    pub fn repos(&self) -> BTreeSet<Repository> {
        self.repos.owned()
    }

    pub fn repos_all(&self) -> BTreeSet<Repository> {
        self.repos.all()
    }

    pub fn repos_delta(&self) -> &BTreeSet<Repository> {
        &self.repos.delta
    }

    pub fn repos_included(&self) -> &BTreeSet<Repository> {
        &self.repos.included
    }

    pub fn add_repo(&mut self, repo: Repository) -> bool {
        self.repos.add(repo)
    }

    pub fn remove_repo(&mut self, repo: &Repository) -> bool {
        self.repos.remove(repo)
    }

    pub fn update_repo(&mut self, repo: Repository) -> bool {
        self.repos.update(repo)
    }

    pub fn find_repo(&self, stub: &str) -> Vec<Repository> {
        self.repos
            .all()
            .into_iter()
            .filter(|r| r.stub.as_deref() == Some(stub))
            .collect()
    }

    pub fn owned_repo(&self, repo: &Repository) -> Option<&Repository> {
        self.repos.get_owned(repo)
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// True when nothing is staged in either delta set
    pub fn delta_is_empty(&self) -> bool {
        self.packages.delta.is_empty() && self.repos.delta.is_empty()
    }

    /// Fold the delta into base after the service accepted an update
    pub fn commit_delta(&mut self) {
        self.packages.commit();
        self.repos.commit();
    }

    /// Serialize for create/update
    ///
    /// Packages and repos are drawn from base ∪ delta, sorted by name and stub
    /// respectively. Included content is never written back; the service
    /// resolves includes from the raw `includes` references.
    pub fn to_object(&self) -> Value {
        let mut obj = Map::new();
        wire::put(&mut obj, "uuid", self.uuid.clone());
        wire::put(&mut obj, "stub", self.name.clone());
        wire::put(&mut obj, "user", self.user.clone());
        wire::put(&mut obj, "name", self.title.clone());
        wire::put(&mut obj, "description", self.description.clone());
        obj.insert("includes".to_string(), Value::from(self.includes.clone()));
        obj.insert(
            "packages".to_string(),
            Value::Array(self.packages().iter().map(Package::to_object).collect()),
        );
        obj.insert(
            "repos".to_string(),
            Value::Array(self.repos().iter().map(Repository::to_object).collect()),
        );
        obj.insert("stores".to_string(), Value::Array(self.stores.clone()));
        obj.insert("archives".to_string(), Value::Array(self.archives.clone()));
        obj.insert("meta".to_string(), Value::Object(self.meta.clone()));
        Value::Object(obj)
    }

    /// Point the template at a new owner/name, dropping its service identity
    pub fn retarget(&mut self, reference: &TemplateRef) {
        self.uuid = None;
        self.user = Some(reference.user.clone());
        self.name = Some(reference.name.clone());
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Template: {} (owner: {}) - R: {}, P: {}",
            self.name.as_deref().unwrap_or("?"),
            self.user.as_deref().unwrap_or("?"),
            self.repos_all().len(),
            self.packages_all().len()
        )
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn array(obj: &Map<String, Value>, key: &str) -> Vec<Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
