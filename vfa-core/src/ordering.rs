// SPDX-License-Identifier: AGPL-3.0-or-later
//! Listing order
//!
//! Nodes are compared through [`SortKey`] snapshots so a sort fetches each
//! node's attributes once. Names compare case-insensitively with digit runs
//! taken as numbers, so `2.txt` sorts before `10.txt`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use crate::error::VfaResult;
use crate::location::extension_of;
use crate::node::Node;

/// Attribute a listing is sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortCriterion {
    #[default]
    Name,
    Size,
    Date,
    Extension,
    Permissions,
    Owner,
    Group,
}

/// Attributes of one node, captured for comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub extension: Option<String>,
    pub permissions: u16,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl SortKey {
    pub fn new(name: impl Into<String>, is_directory: bool) -> Self {
        let name = name.into();
        Self {
            extension: extension_of(&name),
            name,
            is_directory,
            size: 0,
            modified: None,
            permissions: 0,
            owner: None,
            group: None,
        }
    }

    /// Snapshot `node`; a node that vanished sorts as an empty file.
    pub fn from_node(node: &Node) -> VfaResult<Self> {
        let mut key = Self::new(node.name(), false);
        if let Some(meta) = node.metadata()? {
            key.is_directory = meta.is_directory();
            key.size = meta.display_size();
            key.modified = meta.modified;
            key.permissions = meta.permissions.map_or(0, |p| p.to_mode());
            key.owner = meta.owner;
            key.group = meta.group;
        }
        Ok(key)
    }
}

fn take_number(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        let (ca, cb) = match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => (ca, cb),
        };

        let ord = if ca.is_ascii_digit() && cb.is_ascii_digit() {
            compare_numbers(&take_number(&mut a), &take_number(&mut b))
        } else {
            a.next();
            b.next();
            ca.to_lowercase().cmp(cb.to_lowercase())
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Case-insensitive, numeral-aware name order. Names equal under that rule
/// fall back to plain comparison, so only identical names compare equal.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    natural_cmp(a, b).then_with(|| a.cmp(b))
}

/// Compare two snapshots. Directories go first when `directories_first`
/// is set, whatever the direction.
pub fn compare(
    a: &SortKey,
    b: &SortKey,
    criterion: SortCriterion,
    ascending: bool,
    directories_first: bool,
) -> Ordering {
    if directories_first && a.is_directory != b.is_directory {
        return if a.is_directory { Ordering::Less } else { Ordering::Greater };
    }

    let ord = match criterion {
        SortCriterion::Name => compare_names(&a.name, &b.name),
        SortCriterion::Size => a.size.cmp(&b.size),
        SortCriterion::Date => a.modified.cmp(&b.modified),
        SortCriterion::Extension => match (&a.extension, &b.extension) {
            (Some(x), Some(y)) => compare_names(x, y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        },
        SortCriterion::Permissions => a.permissions.cmp(&b.permissions),
        SortCriterion::Owner => a.owner.cmp(&b.owner),
        SortCriterion::Group => a.group.cmp(&b.group),
    };
    let ord = ord.then_with(|| compare_names(&a.name, &b.name));

    if ascending { ord } else { ord.reverse() }
}

/// Compare two nodes, fetching their attributes.
pub fn compare_nodes(
    a: &Node,
    b: &Node,
    criterion: SortCriterion,
    ascending: bool,
    directories_first: bool,
) -> VfaResult<Ordering> {
    Ok(compare(
        &SortKey::from_node(a)?,
        &SortKey::from_node(b)?,
        criterion,
        ascending,
        directories_first,
    ))
}

/// Sort a listing, fetching each node's attributes once.
pub fn sort_nodes(
    nodes: Vec<Arc<Node>>,
    criterion: SortCriterion,
    ascending: bool,
    directories_first: bool,
) -> VfaResult<Vec<Arc<Node>>> {
    let mut keyed = nodes
        .into_iter()
        .map(|node| Ok((SortKey::from_node(&node)?, node)))
        .collect::<VfaResult<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| compare(a, b, criterion, ascending, directories_first));
    Ok(keyed.into_iter().map(|(_, node)| node).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sorted(mut keys: Vec<SortKey>, criterion: SortCriterion, ascending: bool, dirs_first: bool) -> Vec<String> {
        keys.sort_by(|a, b| compare(a, b, criterion, ascending, dirs_first));
        keys.into_iter().map(|k| k.name).collect()
    }

    #[test]
    fn test_numeral_aware_names() {
        let keys = vec![
            SortKey::new("file2.txt", false),
            SortKey::new("10.txt", false),
            SortKey::new("2.txt", false),
        ];
        assert_eq!(sorted(keys, SortCriterion::Name, true, false), ["2.txt", "10.txt", "file2.txt"]);
    }

    #[test]
    fn test_descending_negates() {
        let keys = vec![
            SortKey::new("2.txt", false),
            SortKey::new("10.txt", false),
            SortKey::new("file2.txt", false),
        ];
        assert_eq!(sorted(keys, SortCriterion::Name, false, false), ["file2.txt", "10.txt", "2.txt"]);
    }

    #[test]
    fn test_directories_first_ignores_direction() {
        let keys = vec![
            SortKey::new("b.txt", false),
            SortKey::new("zdir", true),
            SortKey::new("a.txt", false),
            SortKey::new("adir", true),
        ];
        assert_eq!(
            sorted(keys.clone(), SortCriterion::Name, true, true),
            ["adir", "zdir", "a.txt", "b.txt"]
        );
        assert_eq!(sorted(keys, SortCriterion::Name, false, true), ["zdir", "adir", "b.txt", "a.txt"]);
    }

    #[test]
    fn test_case_insensitive_with_stable_tiebreak() {
        assert_eq!(compare_names("apple", "Banana"), Ordering::Less);
        assert_eq!(compare_names("Readme", "readme"), Ordering::Less);
        assert_eq!(compare_names("readme", "readme"), Ordering::Equal);
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(compare_names("img007", "img7"), Ordering::Less);
        assert_eq!(compare_names("img007", "img08"), Ordering::Less);
        assert_eq!(compare_names("v1.10", "v1.9"), Ordering::Greater);
    }

    #[test]
    fn test_size_ties_fall_back_to_name() {
        let mut big = SortKey::new("b", false);
        big.size = 100;
        let mut small_b = SortKey::new("c", false);
        small_b.size = 5;
        let mut small_a = SortKey::new("a", false);
        small_a.size = 5;
        assert_eq!(
            sorted(vec![big, small_b, small_a], SortCriterion::Size, true, false),
            ["a", "c", "b"]
        );
    }

    #[test]
    fn test_missing_extension_first() {
        let keys = vec![SortKey::new("b.zip", false), SortKey::new("Makefile", false), SortKey::new("a.RS", false)];
        assert_eq!(sorted(keys, SortCriterion::Extension, true, false), ["Makefile", "a.RS", "b.zip"]);
    }

    proptest! {
        #[test]
        fn prop_names_antisymmetric(a in "[a-zA-Z0-9._]{0,12}", b in "[a-zA-Z0-9._]{0,12}") {
            prop_assert_eq!(compare_names(&a, &b), compare_names(&b, &a).reverse());
        }

        #[test]
        fn prop_names_equal_only_when_identical(a in "[a-zA-Z0-9]{0,10}", b in "[a-zA-Z0-9]{0,10}") {
            prop_assert_eq!(compare_names(&a, &b) == Ordering::Equal, a == b);
        }

        #[test]
        fn prop_sort_is_consistent(names in proptest::collection::vec("[a-z0-9]{1,6}", 0..20)) {
            let keys: Vec<SortKey> = names.iter().map(|n| SortKey::new(n.clone(), false)).collect();
            let once = sorted(keys.clone(), SortCriterion::Name, true, false);
            let again = sorted(
                once.iter().map(|n| SortKey::new(n.clone(), false)).collect(),
                SortCriterion::Name,
                true,
                false,
            );
            prop_assert_eq!(&once, &again);
            for pair in once.windows(2) {
                prop_assert_ne!(compare_names(&pair[0], &pair[1]), Ordering::Greater);
            }
        }
    }
}
