//! A [`metrics`]-compatible exporter for sending hierarchical metrics to Graphite.
//!
//! ## Basics
//!
//! `metrics-exporter-graphite` is a [`metrics`]-compatible exporter that renders every
//! metric as a dot-separated hierarchical path and pushes plaintext lines to a Graphite
//! carbon endpoint over TCP.
//!
//! ## High-level features
//!
//! - push support to a carbon plaintext listener
//! - a process-wide common tag set (`env`, `appName`, and a generated per-instance
//!   `uuid`) stamped onto every metric and folded into the leading path levels
//! - pluggable naming conventions applied to metric names and tags before path
//!   construction (identity by default)
//! - histograms exported as aggregated summaries with configurable quantiles
//! - backend configuration resolved against host-supplied values with fallback to
//!   built-in defaults
//!
//! ## Behavior
//!
//! This exporter makes some explicit trade-offs to accomplish its task:
//!
//! - Each interval of the exporter will reset any rendered metric, so counters are
//!   emitted as per-interval deltas
//! - All metrics are first aggregated locally and then pushed to the endpoint
//! - Histograms are exported as a series of per-quantile path levels, plus `avg`,
//!   `sum`, and `count`
//! - Only the plaintext carbon protocol is supported; there is currently no support
//!   for the pickle protocol
//! - The exporter connects to the carbon endpoint once per flush; transport errors
//!   are logged and the next flush retries
//!
//! ## Path construction
//!
//! Because Graphite's plaintext protocol has no tag syntax, tags become path levels:
//! the values of tags matching the common tag set lead the path in the common set's
//! fixed order, followed by the metric name, followed by the values of the metric's
//! remaining tags. A metric that lacks one of the common keys simply gets a shorter
//! path for that level — no placeholder is inserted. Tag values are sanitized (`{`,
//! `}`, and spaces become `_`); metric names pass through unchanged.
//!
//! ## Usage
//!
//! Using the exporter is straightforward:
//!
//! ```ignore
//! // First, create a builder.
//! //
//! // The builder can configure many aspects of the exporter, supplying the
//! // required environment and application names, overriding backend
//! // configuration keys, adjusting how histograms will be reported, changing
//! // how long metrics can be idle before being removed, and more.
//! let builder = GraphiteBuilder::new()
//!     .set_environment("prod")
//!     .set_application_name("orders");
//!
//! // Normally, most users will want to "install" the exporter which sets it as the
//! // global recorder for all `metrics` calls, and installs a simple asynchronous
//! // task which pushes to the carbon endpoint on the configured step interval.
//! //
//! // If you're already inside a Tokio runtime, this will spawn a task for the
//! // exporter on that runtime, and otherwise, a new background thread will be
//! // spawned which a Tokio single-threaded runtime is launched on to, where we then
//! // finally launch the exporter:
//! builder.install().expect("failed to install recorder/exporter");
//!
//! // Maybe you have a more complicated setup and want to be handed back the recorder
//! // object and a future that runs the push loop so you can install/spawn them in a
//! // specific way.. also not a problem!
//! let (recorder, exporter) = builder.build().expect("failed to build recorder/exporter");
//!
//! // Finally, maybe you literally only want to build the recorder and nothing else,
//! // and we've got you covered there, too:
//! let recorder = builder.build_recorder().expect("failed to build recorder");
//! ```
//!
//! [`metrics`]: https://docs.rs/metrics
mod common;
pub use self::common::{BuildError, CommonTags};

pub mod config;
pub use self::config::GraphiteConfig;

mod naming;
pub use self::naming::{IdentityNaming, LowercaseNaming, NamingConvention};

mod builder;
pub use self::builder::GraphiteBuilder;

pub mod formatting;
mod recorder;

pub use self::recorder::{GraphiteHandle, GraphiteRecorder};
