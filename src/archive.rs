use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{LevelError, LevelResult};
use crate::model::bar::CompletedBar;
use crate::profile::value_area::{ValueArea, ValueAreaCalculator};

/// Per-bar "complete" flags supplied by the host.
pub trait BarCompletion {
    fn is_complete(&self, index: u64) -> bool;
    fn set_complete(&self, index: u64);
}

#[derive(Debug, Default)]
struct ArchiveInner {
    complete: BTreeSet<u64>,
    bars: BTreeMap<u64, Arc<CompletedBar>>,
}

/// Read-only cache of finalized bars keyed by bar index.
///
/// Writers take the lock only to insert; readers get `Arc` clones that stay
/// valid after eviction. When `capacity` is set the oldest bar data is
/// evicted, but its complete flag is kept.
#[derive(Debug, Default)]
pub struct BarArchive {
    inner: RwLock<ArchiveInner>,
    capacity: Option<usize>,
}

impl BarArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(ArchiveInner::default()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Stores a finalized bar. Fails if the index was already completed.
    pub fn insert(&self, bar: CompletedBar) -> LevelResult<Arc<CompletedBar>> {
        let index = bar.index();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.complete.insert(index) {
            return Err(LevelError::BarAlreadyComplete(index));
        }
        let bar = Arc::new(bar);
        inner.bars.insert(index, Arc::clone(&bar));
        if let Some(capacity) = self.capacity {
            while inner.bars.len() > capacity {
                if inner.bars.pop_first().is_none() {
                    break;
                }
            }
        }
        Ok(bar)
    }

    pub fn get(&self, index: u64) -> Option<Arc<CompletedBar>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.bars.get(&index).cloned()
    }

    /// Memoized value area of an archived bar.
    pub fn value_area(
        &self,
        index: u64,
        calculator: &ValueAreaCalculator,
    ) -> Option<LevelResult<ValueArea>> {
        self.get(index).map(|bar| bar.profile.value_area(calculator))
    }

    /// Archived bars with index in `[from, to]`, ascending.
    pub fn range(&self, from: u64, to: u64) -> Vec<Arc<CompletedBar>> {
        if from > to {
            return Vec::new();
        }
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.bars.range(from..=to).map(|(_, b)| Arc::clone(b)).collect()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_index(&self) -> Option<u64> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.complete.last().copied()
    }
}

impl BarCompletion for BarArchive {
    fn is_complete(&self, index: u64) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.complete.contains(&index)
    }

    fn set_complete(&self, index: u64) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.complete.insert(index);
    }
}
