// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Variants select one realization of a package: a mapping of discrete
//! preference keys to values. The decision tree built from a package's
//! declared variants asks for exactly the keys the package needs, in an
//! order where each choice narrows the candidate set deterministically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mapping from variant key to variant value; keys unique, order irrelevant
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variant(BTreeMap<String, String>);

impl Variant {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Values in key-sorted order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Restriction of this variant to the given keys
    pub fn restricted_to<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Variant {
        Variant(
            keys.into_iter()
                .filter_map(|k| self.0.get(k).map(|v| (k.to_owned(), v.clone())))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variant {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Variant(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Outcome of walking a [`DecisionTree`] with the accumulated global variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Index of the selected variant in the declaration order
    Selected(usize),
    /// The global variant does not decide `key`; one of `values` is needed
    Missing { key: String, values: Vec<String> },
}

/// Decision procedure over the declared variants of one package.
///
/// Every leaf path decides every variant key needed along that path, and
/// at each node the branch key is present in every remaining candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionTree {
    Node {
        key: String,
        branches: Vec<(String, DecisionTree)>,
    },
    Leaf(usize),
}

impl DecisionTree {
    /// Build the tree from a package's declared variants, preserving
    /// first-appearance order of keys and values.
    pub fn from_variants(variants: &[Variant]) -> Result<Self, Error> {
        if variants.is_empty() {
            return Err(Error::NoVariants);
        }

        // Union of keys in first-appearance order
        let mut all_keys: Vec<&str> = Vec::new();
        for variant in variants {
            for key in variant.keys() {
                if !all_keys.contains(&key) {
                    all_keys.push(key);
                }
            }
        }

        let candidates = (0..variants.len()).collect::<Vec<_>>();
        helper(variants, &candidates, &all_keys)
    }

    /// Walk the tree with the accumulated global variant.
    pub fn select(&self, global: &Variant) -> Result<Choice, Error> {
        match self {
            DecisionTree::Leaf(index) => Ok(Choice::Selected(*index)),
            DecisionTree::Node { key, branches } => match global.get(key) {
                None => Ok(Choice::Missing {
                    key: key.clone(),
                    values: branches.iter().map(|(value, _)| value.clone()).collect(),
                }),
                Some(configured) => {
                    let subtree = branches
                        .iter()
                        .find_map(|(value, subtree)| (value.as_str() == configured).then_some(subtree));

                    match subtree {
                        Some(subtree) => subtree.select(global),
                        None => Err(Error::Unsatisfiable {
                            key: key.clone(),
                            value: configured.to_owned(),
                            offered: branches.iter().map(|(value, _)| value.clone()).collect(),
                        }),
                    }
                }
            },
        }
    }

    /// Leaf indices in tree order
    #[cfg(test)]
    fn leaves(&self) -> Vec<usize> {
        match self {
            DecisionTree::Leaf(index) => vec![*index],
            DecisionTree::Node { branches, .. } => {
                branches.iter().flat_map(|(_, subtree)| subtree.leaves()).collect()
            }
        }
    }
}

fn helper(variants: &[Variant], candidates: &[usize], keys_left: &[&str]) -> Result<DecisionTree, Error> {
    if let [single] = candidates {
        let undecided = keys_left.iter().any(|key| variants[*single].contains_key(key));
        if !undecided {
            return Ok(DecisionTree::Leaf(*single));
        }
    }

    // A usable branch key must be present in every candidate
    let key = keys_left
        .iter()
        .find(|key| candidates.iter().all(|c| variants[*c].contains_key(key)))
        .copied()
        .ok_or(Error::NoCommonKeys)?;

    let remaining = keys_left
        .iter()
        .filter(|k| **k != key)
        .copied()
        .collect::<Vec<_>>();

    // Partition by value, preserving first-appearance order of values
    let mut partitions: Vec<(&str, Vec<usize>)> = Vec::new();
    for &candidate in candidates {
        let Some(value) = variants[candidate].get(key) else {
            // The key was checked to be common to every candidate
            return Err(Error::NoCommonKeys);
        };
        match partitions.iter_mut().find(|(v, _)| *v == value) {
            Some((_, bucket)) => bucket.push(candidate),
            None => partitions.push((value, vec![candidate])),
        }
    }

    let branches = partitions
        .into_iter()
        .map(|(value, bucket)| Ok((value.to_owned(), helper(variants, &bucket, &remaining)?)))
        .collect::<Result<_, Error>>()?;

    Ok(DecisionTree::Node {
        key: key.to_owned(),
        branches,
    })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("package declares no variants")]
    NoVariants,
    #[error("ambiguous variant metadata: no key is common to all remaining variants")]
    NoCommonKeys,
    #[error("configured variant {key}={value} is not offered (candidates: {})", offered.join(", "))]
    Unsatisfiable {
        key: String,
        value: String,
        offered: Vec<String>,
    },
}
