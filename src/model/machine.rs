// src/model/machine.rs

//! Machine record
//!
//! A machine is a host registered against a template. The service assigns a
//! uuid and a signing key when the machine is created; later syncs fetch the
//! bound template through a signed request.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::template::{json_kind, TemplateRef};
use super::wire;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Machine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Stub; unique per user
    #[serde(rename = "stub", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// uuid of the bound template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub stores: Vec<Value>,
    pub archives: Vec<Value>,
    pub history: Vec<Value>,
    pub meta: Map<String, Value>,
}

/// Identity handed back by the service on registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineCredentials {
    pub uuid: String,
    pub key: String,
}

impl MachineCredentials {
    pub fn from_wire(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| Error::TypeMismatch {
            expected: "machine registration object",
            found: json_kind(value).to_string(),
        })?;

        Ok(Self {
            uuid: wire::string(obj, "uuid").ok_or(Error::MissingField("uuid"))?,
            key: wire::string(obj, "key").ok_or(Error::MissingField("key"))?,
        })
    }
}

impl Machine {
    pub fn from_ref(reference: &TemplateRef) -> Self {
        Self {
            user: Some(reference.user.clone()),
            name: Some(reference.name.clone()),
            ..Self::default()
        }
    }

    pub fn from_wire(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| Error::TypeMismatch {
            expected: "machine object",
            found: json_kind(value).to_string(),
        })?;

        let (name, title) = match wire::string(obj, "stub") {
            Some(stub) => (Some(stub), wire::string(obj, "name")),
            None => (wire::string(obj, "name"), wire::string(obj, "title")),
        };

        let list = |key: &str| {
            obj.get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        Ok(Self {
            uuid: wire::string(obj, "uuid"),
            user: wire::string(obj, "user").or_else(|| wire::string(obj, "username")),
            name,
            title,
            description: wire::string(obj, "description"),
            template: wire::string(obj, "template"),
            stores: list("stores"),
            archives: list("archives"),
            history: list("history"),
            meta: obj
                .get("meta")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }

    pub fn to_object(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Machine: {} (owner: {})",
            self.name.as_deref().unwrap_or("?"),
            self.user.as_deref().unwrap_or("?")
        )
    }
}
