use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::common::{CommonTags, Snapshot};
use crate::formatting::{key_to_path, write_plaintext_line};
use crate::naming::NamingConvention;

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{GenerationalAtomicStorage, Recency, Registry};
use metrics_util::{Quantile, Summary};

pub(crate) struct Inner {
    pub registry: Registry<Key, GenerationalAtomicStorage>,
    pub recency: Recency<Key>,
    pub common_tags: CommonTags,
    pub convention: Arc<dyn NamingConvention + Send + Sync>,
    pub quantiles: Vec<Quantile>,
}

impl Inner {
    fn get_recent_metrics(&self) -> Snapshot {
        let mut counters = HashMap::new();
        let counter_handles = self.registry.get_counter_handles();
        for (key, counter) in counter_handles {
            let gen = counter.get_generation();
            if !self.recency.should_store_counter(&key, gen, &self.registry) {
                continue;
            }
            let path = key_to_path(&key, &self.common_tags, self.convention.as_ref());
            let value = counter.get_inner().swap(0, Ordering::Acquire);
            let entry = counters.entry(path).or_insert(0);
            *entry += value;
        }

        let mut gauges = HashMap::new();
        let gauge_handles = self.registry.get_gauge_handles();
        for (key, gauge) in gauge_handles {
            let gen = gauge.get_generation();
            if !self.recency.should_store_gauge(&key, gen, &self.registry) {
                continue;
            }

            let path = key_to_path(&key, &self.common_tags, self.convention.as_ref());
            let value = f64::from_bits(gauge.get_inner().swap(0, Ordering::Acquire));
            let entry = gauges.entry(path).or_insert(0.0);
            *entry = value;
        }

        let histogram_handles = self.registry.get_histogram_handles();
        let mut summaries: HashMap<String, (Summary, f64)> = HashMap::new();
        for (key, histogram) in histogram_handles {
            let gen = histogram.get_generation();
            if !self
                .recency
                .should_store_histogram(&key, gen, &self.registry)
            {
                continue;
            }

            let path = key_to_path(&key, &self.common_tags, self.convention.as_ref());

            let entry = summaries
                .entry(path)
                .or_insert_with(|| (Summary::with_defaults(), 0.0));

            histogram.get_inner().clear_with(|samples| {
                for sample in samples {
                    entry.0.add(*sample);
                    entry.1 += *sample;
                }
            });
        }

        Snapshot {
            counters,
            gauges,
            summaries,
        }
    }

    fn render(&self, timestamp: u64) -> String {
        let Snapshot {
            mut counters,
            mut gauges,
            mut summaries,
        } = self.get_recent_metrics();

        let mut output = String::new();

        for (path, value) in counters.drain() {
            if value == 0 {
                continue;
            }
            write_plaintext_line(&mut output, &path, None, value, timestamp);
        }

        for (path, value) in gauges.drain() {
            if value == 0.0 {
                continue;
            }
            write_plaintext_line(&mut output, &path, None, value, timestamp);
        }

        for (path, (summary, sum)) in summaries.drain() {
            let count = summary.count();
            if count == 0 {
                continue;
            }

            for quantile in self.quantiles.iter() {
                let value = summary.quantile(quantile.value()).unwrap_or(0.0);
                write_plaintext_line(&mut output, &path, Some(quantile.label()), value, timestamp);
            }

            write_plaintext_line(
                &mut output,
                &path,
                Some("avg"),
                sum / count as f64,
                timestamp,
            );
            write_plaintext_line(&mut output, &path, Some("sum"), sum, timestamp);
            write_plaintext_line(&mut output, &path, Some("count"), count, timestamp);
        }

        output
    }
}

pub struct GraphiteRecorder {
    inner: Arc<Inner>,
}

impl GraphiteRecorder {
    pub fn handle(&self) -> GraphiteHandle {
        GraphiteHandle {
            inner: self.inner.clone(),
        }
    }

    /// The common tag set stamped onto every metric this recorder renders,
    /// including the generated per-instance identifier.
    pub fn common_tags(&self) -> &CommonTags {
        &self.inner.common_tags
    }
}

impl From<Inner> for GraphiteRecorder {
    fn from(inner: Inner) -> Self {
        GraphiteRecorder {
            inner: Arc::new(inner),
        }
    }
}

impl Recorder for GraphiteRecorder {
    fn describe_counter(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_gauge(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}
    fn describe_histogram(&self, _k: KeyName, _u: Option<Unit>, _d: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.inner
            .registry
            .get_or_create_counter(key, |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.inner
            .registry
            .get_or_create_gauge(key, |c| c.clone().into())
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.inner
            .registry
            .get_or_create_histogram(key, |c| c.clone().into())
    }
}

/// Handle for accessing metrics stored via [`GraphiteRecorder`].
///
/// In certain scenarios, it may be necessary to directly drive the flushes
/// that would otherwise be performed by the push background task.
/// [`GraphiteHandle`] allows rendering a snapshot of the current metrics
/// stored by an installed [`GraphiteRecorder`] as a payload conforming to the
/// Graphite plaintext protocol.
#[derive(Clone)]
pub struct GraphiteHandle {
    inner: Arc<Inner>,
}

impl GraphiteHandle {
    /// Takes a snapshot of the metrics held by the recorder and generates a
    /// payload conforming to the Graphite plaintext protocol, timestamped
    /// with the current wall-clock time.
    pub fn render(&self) -> String {
        self.inner.render(unix_timestamp())
    }

    #[cfg(test)]
    pub(crate) fn render_at(&self, timestamp: u64) -> String {
        self.inner.render(timestamp)
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
