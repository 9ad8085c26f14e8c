// src/model/diff.rs

//! Diff computation between two templates, or a template and the host.
//!
//! Diffs are plain set differences over the identity of each entry, so a
//! version change on the same name/arch is not reported.

use std::collections::BTreeSet;

use super::package::Package;
use super::repository::Repository;
use super::template::Template;

/// Entries in `left` but not `right`, and entries in `right` but not `left`
pub fn package_diff(
    left: &BTreeSet<Package>,
    right: &BTreeSet<Package>,
) -> (Vec<Package>, Vec<Package>) {
    set_diff(left, right)
}

pub fn repo_diff(
    left: &BTreeSet<Repository>,
    right: &BTreeSet<Repository>,
) -> (Vec<Repository>, Vec<Repository>) {
    set_diff(left, right)
}

fn set_diff<T: Ord + Clone>(left: &BTreeSet<T>, right: &BTreeSet<T>) -> (Vec<T>, Vec<T>) {
    (
        left.difference(right).cloned().collect(),
        right.difference(left).cloned().collect(),
    )
}

/// The result of comparing the desired state of two templates
#[derive(Debug, Clone, Default)]
pub struct TemplateDiff {
    /// Packages only in the left template
    pub packages_left: Vec<Package>,

    /// Packages only in the right template
    pub packages_right: Vec<Package>,

    pub repos_left: Vec<Repository>,
    pub repos_right: Vec<Repository>,
}

impl TemplateDiff {
    /// Compare the flattened (`*_all`) views of both templates
    pub fn between(left: &Template, right: &Template) -> Self {
        let (packages_left, packages_right) =
            package_diff(&left.packages_all(), &right.packages_all());
        let (repos_left, repos_right) = repo_diff(&left.repos_all(), &right.repos_all());

        Self {
            packages_left,
            packages_right,
            repos_left,
            repos_right,
        }
    }

    /// Check if the templates describe the same state
    pub fn is_empty(&self) -> bool {
        self.packages_left.is_empty()
            && self.packages_right.is_empty()
            && self.repos_left.is_empty()
            && self.repos_right.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.packages_left.len()
            + self.packages_right.len()
            + self.repos_left.len()
            + self.repos_right.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<Package> {
        names.iter().map(|n| Package::from_string(n)).collect()
    }

    #[test]
    fn test_package_diff_symmetric() {
        let (l, r) = package_diff(&set(&["x", "y"]), &set(&["y", "z"]));
        assert_eq!(l, vec![Package::new("x")]);
        assert_eq!(r, vec![Package::new("z")]);
    }

    #[test]
    fn test_package_diff_ignores_version() {
        let (l, r) = package_diff(&set(&["vim@9.0"]), &set(&["vim@8.2"]));
        assert!(l.is_empty());
        assert!(r.is_empty());
    }

    #[test]
    fn test_package_diff_respects_arch() {
        let (l, r) = package_diff(&set(&["glibc:x86_64"]), &set(&["glibc:i686"]));
        assert_eq!(l.len(), 1);
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_template_diff() {
        let mut a = Template::default();
        a.add_package(Package::new("x"));
        a.add_package(Package::new("y"));
        a.add_repo(Repository::new("fedora"));

        let mut b = Template::default();
        b.add_package(Package::new("y"));
        b.add_repo(Repository::new("fedora"));

        let diff = TemplateDiff::between(&a, &b);
        assert!(!diff.is_empty());
        assert_eq!(diff.change_count(), 1);
        assert_eq!(diff.packages_left[0].name.as_deref(), Some("x"));

        assert!(TemplateDiff::between(&b, &b).is_empty());
    }
}
