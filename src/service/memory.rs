// src/service/memory.rs

//! In-memory template store
//!
//! Behaves like the service for the parts the client depends on: templates
//! and machines are keyed by uuid, looked up by `user:name`, and template
//! includes are resolved transitively into `includes_resolved` on read.
//! Every write is counted.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::{ListFilter, MachineStore, Summary, TemplateStore};
use crate::error::{Error, Result};
use crate::model::TemplateRef;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    templates: BTreeMap<String, Value>,
    machines: BTreeMap<String, Value>,
    machine_keys: BTreeMap<String, String>,
    next_id: u64,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of write calls received
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Seed a template without counting it as a write
    pub fn with_template(mut self, payload: Value) -> Self {
        let uuid = self.allocate("t");
        self.templates.insert(uuid.clone(), stamp(payload, &uuid));
        self
    }

    /// Raw stored payload of `user:name`, without resolved includes
    pub fn stored_template(&self, user: &str, name: &str) -> Option<&Value> {
        find(&self.templates, user, name).and_then(|uuid| self.templates.get(&uuid))
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Payloads of every template reachable through `includes`, depth first
    fn resolve_includes(&self, root: &Value) -> Vec<Value> {
        let mut resolved = Vec::new();
        let mut visited = HashSet::new();
        if let Some(uuid) = root.get("uuid").and_then(Value::as_str) {
            visited.insert(uuid.to_string());
        }
        self.collect_includes(root, &mut visited, &mut resolved);
        resolved
    }

    fn collect_includes(&self, payload: &Value, visited: &mut HashSet<String>, out: &mut Vec<Value>) {
        let owner = field(payload, "user").unwrap_or_default();
        let includes = payload
            .get("includes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for include in includes.iter().filter_map(Value::as_str) {
            let Ok(reference) = TemplateRef::parse(include, &owner) else {
                continue;
            };
            let Some(uuid) = find(&self.templates, &reference.user, &reference.name) else {
                continue;
            };
            if !visited.insert(uuid.clone()) {
                continue;
            }
            if let Some(included) = self.templates.get(&uuid) {
                out.push(included.clone());
                self.collect_includes(included, visited, out);
            }
        }
    }
}

fn field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn stub(payload: &Value) -> Option<String> {
    field(payload, "stub").or_else(|| field(payload, "name"))
}

fn find(collection: &BTreeMap<String, Value>, user: &str, name: &str) -> Option<String> {
    collection
        .iter()
        .find(|(_, v)| {
            field(v, "user").as_deref() == Some(user) && stub(v).as_deref() == Some(name)
        })
        .map(|(uuid, _)| uuid.clone())
}

fn stamp(payload: Value, uuid: &str) -> Value {
    let mut obj = match payload {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    obj.insert("uuid".to_string(), Value::String(uuid.to_string()));
    Value::Object(obj)
}

fn summary(uuid: &str, payload: &Value) -> Summary {
    Summary {
        uuid: Some(uuid.to_string()),
        username: field(payload, "user"),
        stub: stub(payload),
        name: field(payload, "name").filter(|_| payload.get("stub").is_some()),
        description: field(payload, "description"),
        meta: payload.get("meta").cloned(),
        ..Summary::default()
    }
}

fn matches_filter(payload: &Value, filter: &ListFilter) -> bool {
    let user_ok = filter
        .user
        .as_deref()
        .is_none_or(|u| field(payload, "user").as_deref() == Some(u));
    let name_ok = filter
        .name
        .as_deref()
        .is_none_or(|n| stub(payload).as_deref() == Some(n));
    let description_ok = filter.description.as_deref().is_none_or(|d| {
        field(payload, "description").is_some_and(|desc| desc.contains(d))
    });
    let public_ok = !filter.public_only
        || payload
            .pointer("/meta/public")
            .and_then(Value::as_bool)
            .unwrap_or(false);

    user_ok && name_ok && description_ok && public_ok
}

fn not_found(kind: &str, user: &str, name: &str) -> Error {
    Error::NotFound(format!("unable to find {} {}:{}", kind, user, name))
}

impl TemplateStore for MemoryStore {
    fn get_template(&mut self, user: &str, name: &str) -> Result<Value> {
        let uuid = find(&self.templates, user, name).ok_or_else(|| not_found("template", user, name))?;
        let stored = self
            .templates
            .get(&uuid)
            .cloned()
            .ok_or_else(|| not_found("template", user, name))?;

        let resolved = self.resolve_includes(&stored);
        let mut payload = stored;
        if let Value::Object(obj) = &mut payload {
            obj.insert("includes_resolved".to_string(), Value::Array(resolved));
        }
        Ok(payload)
    }

    fn create_template(&mut self, payload: &Value) -> Result<Value> {
        let user = field(payload, "user").unwrap_or_default();
        let name = stub(payload).ok_or_else(|| Error::service("template name is required"))?;
        if find(&self.templates, &user, &name).is_some() {
            return Err(Error::service("template already exists"));
        }

        self.creates += 1;
        let uuid = self.allocate("t");
        self.templates.insert(uuid.clone(), stamp(payload.clone(), &uuid));
        Ok(serde_json::json!({"uuid": uuid}))
    }

    fn update_template(&mut self, uuid: &str, payload: &Value) -> Result<Value> {
        if !self.templates.contains_key(uuid) {
            return Err(Error::service("template does not exist"));
        }
        self.updates += 1;
        self.templates.insert(uuid.to_string(), stamp(payload.clone(), uuid));
        Ok(serde_json::json!({"uuid": uuid}))
    }

    fn delete_template(&mut self, uuid: &str) -> Result<Value> {
        self.templates
            .remove(uuid)
            .ok_or_else(|| Error::service("template does not exist"))?;
        self.deletes += 1;
        Ok(serde_json::json!({}))
    }

    fn list_templates(&mut self, filter: &ListFilter) -> Result<Vec<Summary>> {
        Ok(self
            .templates
            .iter()
            .filter(|(_, v)| matches_filter(v, filter))
            .map(|(uuid, v)| summary(uuid, v))
            .collect())
    }
}

impl MachineStore for MemoryStore {
    fn get_machine(&mut self, user: &str, name: &str) -> Result<Value> {
        let uuid = find(&self.machines, user, name).ok_or_else(|| not_found("machine", user, name))?;
        self.machines
            .get(&uuid)
            .cloned()
            .ok_or_else(|| not_found("machine", user, name))
    }

    fn create_machine(&mut self, payload: &Value) -> Result<Value> {
        let user = field(payload, "user").unwrap_or_default();
        let name = stub(payload).ok_or_else(|| Error::service("machine name is required"))?;
        if find(&self.machines, &user, &name).is_some() {
            return Err(Error::service("machine already exists"));
        }

        self.creates += 1;
        let uuid = self.allocate("m");
        let key = Uuid::new_v4().simple().to_string();
        self.machines.insert(uuid.clone(), stamp(payload.clone(), &uuid));
        self.machine_keys.insert(uuid.clone(), key.clone());
        Ok(serde_json::json!({"uuid": uuid, "key": key}))
    }

    fn update_machine(&mut self, uuid: &str, payload: &Value) -> Result<Value> {
        if !self.machines.contains_key(uuid) {
            return Err(Error::service("machine does not exist"));
        }
        self.updates += 1;
        self.machines.insert(uuid.to_string(), stamp(payload.clone(), uuid));
        Ok(serde_json::json!({"uuid": uuid}))
    }

    fn delete_machine(&mut self, uuid: &str) -> Result<Value> {
        self.machines
            .remove(uuid)
            .ok_or_else(|| Error::service("machine does not exist"))?;
        self.machine_keys.remove(uuid);
        self.deletes += 1;
        Ok(serde_json::json!({}))
    }

    fn list_machines(&mut self, filter: &ListFilter) -> Result<Vec<Summary>> {
        Ok(self
            .machines
            .iter()
            .filter(|(_, v)| matches_filter(v, filter))
            .map(|(uuid, v)| summary(uuid, v))
            .collect())
    }

    fn sync_machine(&mut self, uuid: &str, key: &str) -> Result<Value> {
        if self.machine_keys.get(uuid).map(String::as_str) != Some(key) {
            return Err(Error::service("machine authentication failed"));
        }

        let machine = self
            .machines
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::service("machine does not exist"))?;
        let template_uuid =
            field(&machine, "template").ok_or_else(|| Error::service("machine has no template"))?;
        let template = self
            .templates
            .get(&template_uuid)
            .cloned()
            .ok_or_else(|| Error::service("template does not exist"))?;

        let user = field(&template, "user").unwrap_or_default();
        let name = stub(&template).unwrap_or_default();
        let template = self.get_template(&user, &name)?;

        Ok(serde_json::json!({"machine": machine, "template": template}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_template(json!({
                "stub": "base", "user": "firnsy",
                "packages": [{"n": "bash", "z": 1}]
            }))
            .with_template(json!({
                "stub": "core", "user": "firnsy", "includes": ["base"],
                "packages": [{"n": "vim", "z": 1}]
            }))
            .with_template(json!({
                "stub": "desktop", "user": "firnsy", "includes": ["firnsy:core", "firnsy:desktop"],
                "packages": [{"n": "firefox", "z": 1}],
                "meta": {"public": true}
            }))
    }

    #[test]
    fn test_includes_resolved_transitively() {
        let mut s = store();
        let payload = s.get_template("firnsy", "desktop").unwrap();
        let resolved = payload["includes_resolved"].as_array().unwrap();
        let stubs: Vec<&str> = resolved.iter().map(|v| v["stub"].as_str().unwrap()).collect();
        assert_eq!(stubs, vec!["core", "base"]);
    }

    #[test]
    fn test_missing_template_is_not_found() {
        let mut s = store();
        assert!(matches!(
            s.get_template("firnsy", "server"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filters() {
        let mut s = store();
        let all = s.list_templates(&ListFilter::default()).unwrap();
        assert_eq!(all.len(), 3);

        let public = s
            .list_templates(&ListFilter {
                public_only: true,
                ..ListFilter::default()
            })
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].reference(), "firnsy:desktop");
    }

    #[test]
    fn test_machine_sync_checks_key() {
        let mut s = store();
        let template = s.stored_template("firnsy", "core").unwrap()["uuid"].clone();
        let creds = s
            .create_machine(&json!({"user": "firnsy", "stub": "laptop", "template": template}))
            .unwrap();
        let uuid = creds["uuid"].as_str().unwrap();
        let key = creds["key"].as_str().unwrap();

        assert!(s.sync_machine(uuid, "wrong").is_err());
        let synced = s.sync_machine(uuid, key).unwrap();
        assert_eq!(synced["template"]["stub"], "core");
        assert_eq!(synced["template"]["includes_resolved"][0]["stub"], "base");
        assert_eq!(s.creates, 1);
    }
}
