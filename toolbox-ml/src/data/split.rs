//! Split definitions and the arithmetic that turns them into subset sizes.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Name of the subset that receives data a split leaves unassigned.
pub const REST_SUBSET: &str = "rest";

const FRACTION_TOLERANCE: f64 = 1e-9;

/// Size of one subset: an absolute number of records or a share of the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitSize {
    Count(usize),
    Fraction(f64),
}

/// Ordered subset definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Split {
    entries: Vec<(String, SplitSize)>,
}

impl Split {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split by absolute record counts.
    pub fn counts<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, n)| (name.into(), SplitSize::Count(n)))
                .collect(),
        }
    }

    /// Split by shares of the total, `0.0..=1.0` each.
    pub fn fractions<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, f)| (name.into(), SplitSize::Fraction(f)))
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, size: SplitSize) -> Self {
        self.entries.push((name.into(), size));
        self
    }

    pub fn entries(&self) -> &[(String, SplitSize)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the split against `available` records.
    ///
    /// Returns `(name, count)` pairs in order, including a trailing
    /// [`REST_SUBSET`] when the split does not use everything. The counts
    /// always sum to `available`.
    pub fn resolve(&self, available: usize) -> Result<Vec<(String, usize)>, MlError> {
        if self.entries.is_empty() {
            return Err(MlError::invalid_split("split defines no subsets"));
        }
        for (i, (name, _)) in self.entries.iter().enumerate() {
            if name.is_empty() {
                return Err(MlError::invalid_split("subset names must not be empty"));
            }
            if self.entries[..i].iter().any(|(other, _)| other == name) {
                return Err(MlError::DuplicateSubset(name.clone()));
            }
        }

        let all_counts = self
            .entries
            .iter()
            .all(|(_, size)| matches!(size, SplitSize::Count(_)));
        let all_fractions = self
            .entries
            .iter()
            .all(|(_, size)| matches!(size, SplitSize::Fraction(_)));

        if all_counts {
            self.resolve_counts(available)
        } else if all_fractions {
            self.resolve_fractions(available)
        } else {
            Err(MlError::invalid_split(
                "cannot mix record counts and fractions in one split",
            ))
        }
    }

    fn resolve_counts(&self, available: usize) -> Result<Vec<(String, usize)>, MlError> {
        let mut sizes: Vec<(String, usize)> = self
            .entries
            .iter()
            .map(|(name, size)| match size {
                SplitSize::Count(n) => (name.clone(), *n),
                SplitSize::Fraction(_) => unreachable!("checked by resolve"),
            })
            .collect();
        let total: usize = sizes.iter().map(|(_, n)| n).sum();

        if total > available {
            return Err(MlError::NotEnoughData(format!(
                "Not enough data! Split requires a total of {total} data entries \
                 but only {available} are available."
            )));
        }
        if total < available {
            push_rest(&mut sizes, available - total)?;
        }
        Ok(sizes)
    }

    fn resolve_fractions(&self, available: usize) -> Result<Vec<(String, usize)>, MlError> {
        let mut shares: Vec<(String, f64)> = Vec::with_capacity(self.entries.len() + 1);
        for (name, size) in &self.entries {
            let SplitSize::Fraction(f) = *size else {
                unreachable!("checked by resolve");
            };
            if !f.is_finite() || f < 0.0 {
                return Err(MlError::invalid_split(format!(
                    "fraction for '{name}' must be a finite, non-negative number"
                )));
            }
            shares.push((name.clone(), f));
        }
        let total: f64 = shares.iter().map(|(_, f)| f).sum();

        if total > 1.0 + FRACTION_TOLERANCE {
            return Err(MlError::NotEnoughData(format!(
                "Not enough data! Split requires a total of {}%. \
                 Split should not exceed 100%.",
                total * 100.0
            )));
        }
        if total < 1.0 - FRACTION_TOLERANCE {
            if shares.iter().any(|(name, _)| name == REST_SUBSET) {
                return Err(MlError::DuplicateSubset(REST_SUBSET.to_string()));
            }
            shares.push((REST_SUBSET.to_string(), 1.0 - total));
        }

        Ok(fractions_to_counts(&shares, available))
    }
}

fn push_rest(sizes: &mut Vec<(String, usize)>, leftover: usize) -> Result<(), MlError> {
    if sizes.iter().any(|(name, _)| name == REST_SUBSET) {
        return Err(MlError::DuplicateSubset(REST_SUBSET.to_string()));
    }
    sizes.push((REST_SUBSET.to_string(), leftover));
    Ok(())
}

/// Each share takes its proportion of what the shares before it left over,
/// so the last one absorbs the rounding and the counts sum to `available`.
/// The tolerance keeps `0.2 / 0.3` of 30 at 20 instead of 19.
fn fractions_to_counts(shares: &[(String, f64)], available: usize) -> Vec<(String, usize)> {
    let mut remaining = available;
    let mut out = Vec::with_capacity(shares.len());
    for (i, (name, share)) in shares.iter().enumerate() {
        let tail: f64 = shares[i..].iter().map(|(_, f)| f).sum();
        let count = if i + 1 == shares.len() {
            remaining
        } else if tail > 0.0 {
            ((remaining as f64) * (share / tail) + FRACTION_TOLERANCE).floor() as usize
        } else {
            0
        };
        let count = count.min(remaining);
        out.push((name.clone(), count));
        remaining -= count;
    }
    out
}
