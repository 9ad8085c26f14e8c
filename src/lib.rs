// src/lib.rs

//! Canvas template client
//!
//! Keeps dnf-based systems in step with templates stored on a Canvas
//! service. A template names the repositories and packages a machine should
//! have; templates may include other templates.
//!
//! # Architecture
//!
//! - Templates: three tiers of packages and repos (base, included, delta);
//!   local edits land in the delta until the remote update succeeds
//! - Reconciliation: a template's desired state is handed to the host package
//!   manager as install/erase requests, resolved, then previewed or committed
//! - Remote store: narrow get/create/update/delete contract over JSON payloads
//! - Backends: `dnf` on real hosts, an in-memory package manager for tests

pub mod backend;
pub mod config;
mod error;
pub mod model;
pub mod service;
pub mod sync;

pub use backend::{HostPackage, MultilibPolicy, PackageBackend, Resolution};
pub use config::Config;
pub use error::{Error, Result};
pub use model::{
    package_diff, repo_diff, Action, Machine, Package, PackageScope, Repository, SystemState,
    Template, TemplateDiff, TemplateRef,
};
pub use service::{ListFilter, MachineStore, Summary, TemplateStore, DEFAULT_HOST};
pub use sync::{
    stage_system, sync_template, StagedChanges, SyncEngine, SyncOptions, SyncOutcome,
    SyncReport, SyncState,
};
