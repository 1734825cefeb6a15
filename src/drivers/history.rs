use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use crate::drivers::AcquisitionError;
use crate::types::Sample;
/// Append-only record of every accepted sample. There is exactly one
/// `HistoryStore` (owned by the scheduler); readers get a [`HistoryView`].
#[derive(Default)]
pub struct HistoryStore {
    samples: Arc<RwLock<Vec<Sample>>>,
}
impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    /// Appends `sample` and returns the new length. Timestamps must strictly
    /// increase.
    pub fn append(&mut self, sample: Sample) -> Result<usize, AcquisitionError> {
        let mut samples = self.samples.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = samples.last() {
            if sample.timestamp <= previous.timestamp {
                return Err(AcquisitionError::OutOfOrder {
                    previous: previous.timestamp.to_rfc3339(),
                    next: sample.timestamp.to_rfc3339(),
                });
            }
        }
        samples.push(sample);
        Ok(samples.len())
    }
    pub fn len(&self) -> usize {
        self.view().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn view(&self) -> HistoryView {
        HistoryView {
            samples: Arc::clone(&self.samples),
        }
    }
}
/// Read-only handle onto a [`HistoryStore`].
#[derive(Clone)]
pub struct HistoryView {
    samples: Arc<RwLock<Vec<Sample>>>,
}
impl std::fmt::Debug for HistoryView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryView").field("len", &self.len()).finish()
    }
}
impl HistoryView {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Sample>> {
        self.samples.read().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn len(&self) -> usize {
        self.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
    pub fn snapshot(&self) -> Vec<Sample> {
        self.read().clone()
    }
    /// Samples from index `from` onward; pass the previous length to get only
    /// what arrived since the last call.
    pub fn tail(&self, from: usize) -> Vec<Sample> {
        let samples = self.read();
        samples.get(from..).map(<[Sample]>::to_vec).unwrap_or_default()
    }
    pub fn last(&self) -> Option<Sample> {
        self.read().last().cloned()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeDelta};
    fn sample_at(offset_secs: i64, flux: f64) -> Sample {
        Sample {
            timestamp: Local::now() + TimeDelta::seconds(offset_secs),
            heat_flux: flux,
            temperatures: vec![21.0],
        }
    }
    #[test]
    fn appends_in_order_and_views_follow() {
        let mut store = HistoryStore::new();
        let view = store.view();
        let base = sample_at(0, 1.0);
        let mut second = base.clone();
        second.timestamp += TimeDelta::seconds(60);
        assert_eq!(store.append(base).unwrap(), 1);
        assert_eq!(store.append(second.clone()).unwrap(), 2);
        assert_eq!(view.len(), 2);
        assert_eq!(view.last(), Some(second));
        assert_eq!(view.tail(1).len(), 1);
        assert!(view.tail(2).is_empty());
        assert!(view.tail(10).is_empty());
    }
    #[test]
    fn rejects_non_increasing_timestamps() {
        let mut store = HistoryStore::new();
        let first = sample_at(0, 1.0);
        let same = first.clone();
        store.append(first).unwrap();
        assert!(matches!(
            store.append(same),
            Err(AcquisitionError::OutOfOrder { .. })
        ));
        assert_eq!(store.len(), 1);
    }
}
