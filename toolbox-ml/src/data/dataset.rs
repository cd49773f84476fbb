//! Datasets that can be split, recursively, into named subsets.
//!
//! A [`Dataset`] is either a leaf holding records or a superset holding
//! ordered sub-datasets. Length and indexing are defined over the whole
//! tree, so a superset behaves like the concatenation of its subsets.

use crate::data::split::Split;
use crate::error::MlError;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options applied while splitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOptions {
    /// Shuffle the records before carving out subsets.
    #[serde(default)]
    pub shuffle: bool,
    /// Seed for the shuffle. Uses the thread RNG when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SplitOptions {
    pub fn shuffled(seed: Option<u64>) -> Self {
        Self {
            shuffle: true,
            seed,
        }
    }
}

/// Contents of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node<T> {
    Leaf(Vec<T>),
    Composite(Vec<Dataset<T>>),
}

/// A named collection of records, possibly split into subsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset<T> {
    name: String,
    node: Node<T>,
}

impl<T> Dataset<T> {
    pub fn new(name: impl Into<String>, records: Vec<T>) -> Self {
        Self {
            name: name.into(),
            node: Node::Leaf(records),
        }
    }

    /// Build a dataset and split it right away.
    pub fn with_split(
        name: impl Into<String>,
        records: Vec<T>,
        split: &Split,
    ) -> Result<Self, MlError> {
        let mut dataset = Self::new(name, records);
        dataset.split(split)?;
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &Node<T> {
        &self.node
    }

    pub fn is_superset(&self) -> bool {
        matches!(self.node, Node::Composite(_))
    }

    /// Total number of records, counting through all subsets.
    pub fn len(&self) -> usize {
        match &self.node {
            Node::Leaf(records) => records.len(),
            Node::Composite(subsets) => subsets.iter().map(Dataset::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at global position `idx`; subsets are laid out in split order.
    pub fn get(&self, idx: usize) -> Option<&T> {
        match &self.node {
            Node::Leaf(records) => records.get(idx),
            Node::Composite(subsets) => {
                let mut offset = idx;
                for subset in subsets {
                    let len = subset.len();
                    if offset < len {
                        return subset.get(offset);
                    }
                    offset -= len;
                }
                None
            }
        }
    }

    /// Records held directly by a leaf. `None` for a superset.
    pub fn records(&self) -> Option<&[T]> {
        match &self.node {
            Node::Leaf(records) => Some(records),
            Node::Composite(_) => None,
        }
    }

    /// Ordered subsets. Empty for a leaf.
    pub fn subsets(&self) -> &[Dataset<T>] {
        match &self.node {
            Node::Leaf(_) => &[],
            Node::Composite(subsets) => subsets,
        }
    }

    /// Look up a direct subset by its short name (`"train"`, not `"data.train"`).
    pub fn subset(&self, name: &str) -> Option<&Dataset<T>> {
        let full = self.subset_name(name);
        self.subsets().iter().find(|s| s.name == full)
    }

    pub fn subset_mut(&mut self, name: &str) -> Option<&mut Dataset<T>> {
        let full = self.subset_name(name);
        match &mut self.node {
            Node::Leaf(_) => None,
            Node::Composite(subsets) => subsets.iter_mut().find(|s| s.name == full),
        }
    }

    fn subset_name(&self, name: &str) -> String {
        format!("{}.{}", self.name, name)
    }

    /// All records in global order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match &self.node {
            Node::Leaf(records) => Box::new(records.iter()),
            Node::Composite(subsets) => Box::new(subsets.iter().flat_map(|s| s.iter())),
        }
    }

    /// Split a leaf into subsets without shuffling.
    pub fn split(&mut self, split: &Split) -> Result<(), MlError> {
        self.split_with(split, &SplitOptions::default())
    }

    /// Split a leaf into subsets named `"{name}.{subset}"`.
    ///
    /// Subsets are contiguous runs of the (optionally shuffled) records in
    /// split order. Splitting a superset is rejected; split one of its
    /// subsets instead.
    pub fn split_with(&mut self, split: &Split, options: &SplitOptions) -> Result<(), MlError> {
        let records = match &mut self.node {
            Node::Leaf(records) => records,
            Node::Composite(_) => return Err(MlError::AlreadySplit(self.name.clone())),
        };
        let sizes = split.resolve(records.len())?;

        if options.shuffle {
            shuffle_records(records, options.seed);
        }

        let mut remaining = std::mem::take(records).into_iter();
        let subsets: Vec<Dataset<T>> = sizes
            .iter()
            .map(|(name, count)| {
                let chunk: Vec<T> = remaining.by_ref().take(*count).collect();
                Dataset::new(self.subset_name(name), chunk)
            })
            .collect();

        tracing::debug!(
            dataset = %self.name,
            subsets = ?sizes,
            shuffled = options.shuffle,
            "Split dataset"
        );
        self.node = Node::Composite(subsets);
        Ok(())
    }

    /// Shuffle records in place. A superset shuffles each of its leaves
    /// independently, so subset membership never changes.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        match &mut self.node {
            Node::Leaf(records) => shuffle_records(records, seed),
            Node::Composite(subsets) => {
                let mut seeds = seed.map(StdRng::seed_from_u64);
                for subset in subsets {
                    subset.shuffle(seeds.as_mut().map(RngCore::next_u64));
                }
            }
        }
    }
}

fn shuffle_records<T>(records: &mut [T], seed: Option<u64>) {
    match seed {
        Some(seed) => records.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => records.shuffle(&mut rand::thread_rng()),
    }
}

impl<T> fmt::Display for Dataset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "-".repeat(self.name.chars().count()))?;
        writeln!(f, "Contains {} data entries.", self.len())?;
        for subset in self.subsets() {
            writeln!(f, "\tSubset {}: {} entries.", subset.name, subset.len())?;
        }
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a Dataset<T> {
    type Item = &'a T;
    type IntoIter = Box<dyn Iterator<Item = &'a T> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
