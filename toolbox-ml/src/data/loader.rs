//! Batch sources consumed by the training loop.

use crate::data::dataset::Dataset;
use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Anything that can hand out one epoch's worth of batches at a time.
pub trait BatchSource {
    type Batch;

    /// Batches for the next epoch, in the order they should be processed.
    fn epoch(&mut self) -> impl Iterator<Item = Self::Batch> + '_;

    /// Position the source so the next call to [`epoch`](Self::epoch)
    /// yields the batches of epoch `epoch` (1-based).
    fn seek_epoch(&mut self, _epoch: usize) {}
}

impl<B: Clone> BatchSource for Vec<B> {
    type Batch = B;

    fn epoch(&mut self) -> impl Iterator<Item = B> + '_ {
        self.iter().cloned()
    }
}

/// Batches records of a dataset, optionally reshuffling every epoch.
#[derive(Debug)]
pub struct DataLoader<'a, T> {
    dataset: &'a Dataset<T>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<u64>,
    next_epoch: usize,
}

impl<'a, T: Clone> DataLoader<'a, T> {
    pub fn new(dataset: &'a Dataset<T>, batch_size: usize) -> Result<Self, MlError> {
        if batch_size == 0 {
            return Err(MlError::invalid_input("batch_size must be at least 1"));
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: None,
            next_epoch: 1,
        })
    }

    /// Visit records in a new random order each epoch. With a seed, the
    /// order of every epoch depends only on the seed and the epoch number.
    pub fn shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    /// Skip the final batch when it is smaller than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batches_per_epoch(&self) -> usize {
        let len = self.dataset.len();
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    fn epoch_order(&mut self) -> Vec<usize> {
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            match self.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(epoch_seed(seed, epoch));
                    order.shuffle(&mut rng);
                }
                None => order.shuffle(&mut rand::thread_rng()),
            }
        }
        order
    }
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl<T: Clone> BatchSource for DataLoader<'_, T> {
    type Batch = Vec<T>;

    fn seek_epoch(&mut self, epoch: usize) {
        self.next_epoch = epoch;
    }

    fn epoch(&mut self) -> impl Iterator<Item = Vec<T>> + '_ {
        let order = self.epoch_order();
        let batch_size = self.batch_size;
        let drop_last = self.drop_last;
        let dataset = self.dataset;
        let batches: Vec<Vec<T>> = order
            .chunks(batch_size)
            .filter(|chunk| !drop_last || chunk.len() == batch_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .filter_map(|&i| dataset.get(i).cloned())
                    .collect::<Vec<T>>()
            })
            .collect();
        batches.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Dataset<usize> {
        Dataset::new("n", (0..n).collect())
    }

    #[test]
    fn test_vec_source_repeats_each_epoch() {
        let mut batches = vec![1, 2, 3];
        assert_eq!(batches.epoch().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(batches.epoch().count(), 3);
    }

    #[test]
    fn test_sequential_batches() {
        let ds = dataset(7);
        let mut loader = DataLoader::new(&ds, 3).unwrap();
        assert_eq!(loader.batches_per_epoch(), 3);
        let batches: Vec<Vec<usize>> = loader.epoch().collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[test]
    fn test_drop_last() {
        let ds = dataset(7);
        let mut loader = DataLoader::new(&ds, 3).unwrap().drop_last(true);
        assert_eq!(loader.batches_per_epoch(), 2);
        assert_eq!(loader.epoch().count(), 2);
    }

    #[test]
    fn test_seeded_shuffle_covers_everything() {
        let ds = dataset(20);
        let mut a = DataLoader::new(&ds, 4).unwrap().shuffle(Some(1));
        let mut b = DataLoader::new(&ds, 4).unwrap().shuffle(Some(1));

        let first: Vec<usize> = a.epoch().flatten().collect();
        assert_eq!(first, b.epoch().flatten().collect::<Vec<_>>());

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());

        let second: Vec<usize> = a.epoch().flatten().collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_seek_epoch_replays_that_epochs_order() {
        let ds = dataset(12);
        let mut full = DataLoader::new(&ds, 3).unwrap().shuffle(Some(0));
        let _first: Vec<Vec<usize>> = full.epoch().collect();
        let second: Vec<Vec<usize>> = full.epoch().collect();

        let mut resumed = DataLoader::new(&ds, 3).unwrap().shuffle(Some(0));
        resumed.seek_epoch(2);
        assert_eq!(resumed.epoch().collect::<Vec<_>>(), second);

        resumed.seek_epoch(2);
        assert_eq!(resumed.epoch().collect::<Vec<_>>(), second);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let ds = dataset(1);
        assert!(matches!(
            DataLoader::new(&ds, 0),
            Err(MlError::InvalidInput(_))
        ));
    }
}
