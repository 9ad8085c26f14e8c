// src/model/mod.rs

//! Template Model - Declarative package and repository state
//!
//! A template describes the desired state of a machine: the repositories it
//! should have enabled and the packages it should (or should not) have
//! installed. Templates live on the Canvas service and may include other
//! templates; the service resolves those includes and the client folds them
//! into a read-only tier of the template.
//!
//! Canvas then computes the difference between the host and the template,
//! and hands the resulting install/remove requests to the package manager.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "stub": "desktop",
//!   "user": "firnsy",
//!   "name": "Korora Desktop",
//!   "includes": ["firnsy:core"],
//!   "packages": [{"n": "vim", "z": 1}, {"n": "sendmail", "z": 2}],
//!   "repos": [{"s": "korora", "bu": ["http://repo.kororaproject.org/"], "e": true}],
//!   "meta": {"public": true}
//! }
//! ```

pub mod diff;
pub mod machine;
pub mod package;
pub mod repository;
pub mod state;
pub mod template;
pub(crate) mod wire;

pub use diff::{package_diff, repo_diff, TemplateDiff};
pub use machine::{Machine, MachineCredentials};
pub use package::{Action, Package};
pub use repository::{RepoConfig, Repository};
pub use state::{PackageScope, SystemState};
pub use template::{Template, TemplateRef};
pub use wire::parse_bool;
