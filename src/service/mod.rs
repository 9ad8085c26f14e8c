// src/service/mod.rs

//! Remote template store
//!
//! The Canvas service stores templates and machines as JSON documents. The
//! traits here are the narrow contract the rest of the crate relies on; they
//! deal in raw payloads so the model parsers stay the single place that
//! interprets them. The free functions wrap the traits with model types.
//!
//! Implementations:
//!
//! - [`client::ServiceClient`] - HTTP client for a real service
//! - [`memory::MemoryStore`] - in-memory store that counts writes

pub mod client;
pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::wire;
use crate::model::{Machine, MachineCredentials, Template, TemplateRef};

pub use client::ServiceClient;
pub use memory::MemoryStore;

/// Public Canvas service
pub const DEFAULT_HOST: &str = "https://canvas.kororaproject.org";

/// One row of a template or machine listing
///
/// Older service versions send `id`/`user` where newer ones send
/// `uuid`/`username`, sometimes both. The public flag arrives either at the
/// top level or inside `meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub uuid: Option<String>,
    pub id: Option<String>,
    pub username: Option<String>,
    pub user: Option<String>,
    pub stub: Option<String>,
    /// Display title
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<Value>,
    pub meta: Option<Value>,
}

impl Summary {
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref().or(self.id.as_deref())
    }

    pub fn owner(&self) -> Option<&str> {
        self.username.as_deref().or(self.user.as_deref())
    }

    pub fn is_public(&self) -> bool {
        self.public
            .as_ref()
            .or_else(|| self.meta.as_ref().and_then(|m| m.get("public")))
            .and_then(wire::flag)
            .unwrap_or(false)
    }

    /// `user:stub` as shown in listings
    pub fn reference(&self) -> String {
        format!(
            "{}:{}",
            self.owner().unwrap_or(""),
            self.stub.as_deref().unwrap_or("")
        )
    }
}

/// Filters for listing templates or machines
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub user: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Only templates flagged public
    pub public_only: bool,
}

impl ListFilter {
    /// Query parameters for the filters that are set
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = [
            ("user", &self.user),
            ("name", &self.name),
            ("description", &self.description),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_ref().filter(|s| !s.is_empty()).map(|s| (k, s.clone())))
        .collect();

        if self.public_only {
            pairs.push(("public", "1".to_string()));
        }
        pairs
    }

    /// Whether a listed row passes the filters the service may ignore
    ///
    /// Services that do not understand `public` return every template, so
    /// the flag is checked again on the rows that come back.
    pub fn admits(&self, summary: &Summary) -> bool {
        !self.public_only || summary.is_public()
    }
}

/// Template half of the remote contract
pub trait TemplateStore {
    /// Full payload of the template `user:name`, with resolved includes
    fn get_template(&mut self, user: &str, name: &str) -> Result<Value>;

    fn create_template(&mut self, payload: &Value) -> Result<Value>;

    fn update_template(&mut self, uuid: &str, payload: &Value) -> Result<Value>;

    fn delete_template(&mut self, uuid: &str) -> Result<Value>;

    fn list_templates(&mut self, filter: &ListFilter) -> Result<Vec<Summary>>;
}

/// Machine half of the remote contract
pub trait MachineStore {
    fn get_machine(&mut self, user: &str, name: &str) -> Result<Value>;

    /// Register a machine; the response carries its `uuid` and `key`
    fn create_machine(&mut self, payload: &Value) -> Result<Value>;

    fn update_machine(&mut self, uuid: &str, payload: &Value) -> Result<Value>;

    fn delete_machine(&mut self, uuid: &str) -> Result<Value>;

    fn list_machines(&mut self, filter: &ListFilter) -> Result<Vec<Summary>>;

    /// Signed fetch of the machine's sync document, including its template
    fn sync_machine(&mut self, uuid: &str, key: &str) -> Result<Value>;
}

pub fn fetch_template<S: TemplateStore + ?Sized>(
    store: &mut S,
    reference: &TemplateRef,
) -> Result<Template> {
    debug!("Fetching template {}", reference);
    let payload = store.get_template(&reference.user, &reference.name)?;
    Template::from_wire(&payload)
}

pub fn create_template<S: TemplateStore + ?Sized>(
    store: &mut S,
    template: &mut Template,
) -> Result<Value> {
    let response = store.create_template(&template.to_object())?;
    if let Some(uuid) = response.get("uuid").and_then(Value::as_str) {
        template.uuid = Some(uuid.to_string());
    }
    template.commit_delta();
    Ok(response)
}

/// Write base ∪ delta back and fold the delta into base on success
pub fn update_template<S: TemplateStore + ?Sized>(
    store: &mut S,
    template: &mut Template,
) -> Result<Value> {
    let uuid = template.uuid.clone().ok_or_else(|| Error::TypeMismatch {
        expected: "stored template",
        found: "template without uuid".to_string(),
    })?;

    let response = store.update_template(&uuid, &template.to_object())?;
    template.commit_delta();
    Ok(response)
}

pub fn delete_template<S: TemplateStore + ?Sized>(
    store: &mut S,
    reference: &TemplateRef,
) -> Result<Value> {
    let template = fetch_template(store, reference)?;
    let uuid = template.uuid.ok_or(Error::MissingField("uuid"))?;
    store.delete_template(&uuid)
}

pub fn fetch_machine<S: MachineStore + ?Sized>(
    store: &mut S,
    reference: &TemplateRef,
) -> Result<Machine> {
    Machine::from_wire(&store.get_machine(&reference.user, &reference.name)?)
}

pub fn create_machine<S: MachineStore + ?Sized>(
    store: &mut S,
    machine: &Machine,
) -> Result<MachineCredentials> {
    MachineCredentials::from_wire(&store.create_machine(&machine.to_object())?)
}

pub fn update_machine<S: MachineStore + ?Sized>(store: &mut S, machine: &Machine) -> Result<Value> {
    let uuid = machine.uuid.as_deref().ok_or(Error::MissingField("uuid"))?;
    store.update_machine(uuid, &machine.to_object())
}

pub fn delete_machine<S: MachineStore + ?Sized>(
    store: &mut S,
    reference: &TemplateRef,
) -> Result<Value> {
    let machine = fetch_machine(store, reference)?;
    let uuid = machine.uuid.ok_or(Error::MissingField("uuid"))?;
    store.delete_machine(&uuid)
}

/// The template bound to a registered machine
pub fn fetch_machine_template<S: MachineStore + ?Sized>(
    store: &mut S,
    uuid: &str,
    key: &str,
) -> Result<Template> {
    let response = store.sync_machine(uuid, key)?;
    let template = response.get("template").ok_or(Error::MissingField("template"))?;
    Template::from_wire(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Package;
    use serde_json::json;

    #[test]
    fn test_query_pairs_skip_empty() {
        let filter = ListFilter {
            user: Some("firnsy".to_string()),
            name: Some(String::new()),
            ..ListFilter::default()
        };
        assert_eq!(filter.query_pairs(), vec![("user", "firnsy".to_string())]);
    }

    #[test]
    fn test_public_only_filter() {
        let filter = ListFilter {
            public_only: true,
            ..ListFilter::default()
        };
        assert_eq!(filter.query_pairs(), vec![("public", "1".to_string())]);

        let public: Summary =
            serde_json::from_value(json!({"stub": "a", "meta": {"public": "1"}})).unwrap();
        let flat: Summary = serde_json::from_value(json!({"stub": "b", "public": true})).unwrap();
        let private: Summary = serde_json::from_value(json!({"stub": "c"})).unwrap();

        assert!(filter.admits(&public));
        assert!(filter.admits(&flat));
        assert!(!filter.admits(&private));
        assert!(ListFilter::default().admits(&private));
    }

    #[test]
    fn test_summary_accepts_either_spelling() {
        let s: Summary =
            serde_json::from_value(json!({"id": "t-1", "user": "firnsy", "stub": "core"})).unwrap();
        assert_eq!(s.uuid(), Some("t-1"));
        assert_eq!(s.reference(), "firnsy:core");
    }

    #[test]
    fn test_update_requires_uuid() {
        let mut store = MemoryStore::new();
        let mut t = Template::default();
        assert!(matches!(
            update_template(&mut store, &mut t),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_update_commits_delta() {
        let mut store = MemoryStore::new();
        let reference = TemplateRef::parse("firnsy:core", "firnsy").unwrap();
        let mut t = Template::from_ref(&reference);
        create_template(&mut store, &mut t).unwrap();
        assert!(t.uuid.is_some());

        t.add_package(Package::new("vim"));
        update_template(&mut store, &mut t).unwrap();
        assert!(t.delta_is_empty());

        let fetched = fetch_template(&mut store, &reference).unwrap();
        assert!(fetched.packages().contains(&Package::new("vim")));
    }
}
