//! Bounded time series.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// One point. `time_ms` is absent when only the order is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time_ms: Option<f64>,
    pub value: f64,
}

/// Ring of samples; the oldest drop silently past `max_len`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    samples: VecDeque<Sample>,
    max_len: usize,
}

impl TimeSeries {
    /// `max_len` is clamped to at least 1.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            samples: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    /// Build from samples, keeping the newest `max_len`.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>, max_len: usize) -> Self {
        let mut series = Self::new(max_len);
        for s in samples {
            series.push_sample(s);
        }
        series
    }

    /// Append an untimed value.
    pub fn push(&mut self, value: f64) {
        self.push_sample(Sample {
            time_ms: None,
            value,
        });
    }

    /// Append a timed value.
    pub fn push_at(&mut self, time_ms: f64, value: f64) {
        self.push_sample(Sample {
            time_ms: Some(time_ms),
            value,
        });
    }

    pub fn push_sample(&mut self, sample: Sample) {
        if self.samples.len() == self.max_len {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A [`TimeSeries`] shared between a writer task and readers.
#[derive(Debug, Clone)]
pub struct SharedSeries {
    inner: Arc<Mutex<TimeSeries>>,
}

impl SharedSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimeSeries::new(max_len))),
        }
    }

    pub fn push_at(&self, time_ms: f64, value: f64) {
        self.inner.lock().push_at(time_ms, value);
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> TimeSeries {
        self.inner.lock().clone()
    }
}
