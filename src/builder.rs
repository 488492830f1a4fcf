use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use std::thread;

use metrics_util::registry::{GenerationalStorage, Recency, Registry};
use metrics_util::{parse_quantiles, MetricKindMask, Quantile};

use crate::common::{BuildError, CommonTags};
use crate::config::{self, GraphiteConfig};
use crate::naming::{IdentityNaming, NamingConvention};
use crate::recorder::{GraphiteRecorder, Inner};

use quanta::Clock;
use tokio::io::AsyncWriteExt;
use tokio::{net::TcpStream, runtime};
use tracing::error;

use std::net::{SocketAddr, ToSocketAddrs};

type ExporterFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'static>>;

/// Builder for creating and installing a Graphite recorder/exporter.
pub struct GraphiteBuilder {
    environment: Option<String>,
    app_name: Option<String>,
    config: GraphiteConfig,
    quantiles: Vec<Quantile>,
    idle_timeout: Option<Duration>,
    recency_mask: MetricKindMask,
    convention: Arc<dyn NamingConvention + Send + Sync>,
}

impl GraphiteBuilder {
    /// Creates a new [`GraphiteBuilder`].
    pub fn new() -> Self {
        let quantiles = parse_quantiles(&[0.0, 0.5, 0.9, 0.95, 0.99, 0.999, 1.0]);
        Self {
            environment: None,
            app_name: None,
            config: GraphiteConfig::new(),
            quantiles,
            idle_timeout: None,
            recency_mask: MetricKindMask::NONE,
            convention: Arc::new(IdentityNaming),
        }
    }

    /// Sets the deployment environment name.
    ///
    /// Required: building the recorder fails without it, since the common tag
    /// set stamped onto every metric cannot be formed.
    #[must_use]
    pub fn set_environment<E>(mut self, environment: E) -> Self
    where
        E: Into<String>,
    {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the application name.
    ///
    /// Required: building the recorder fails without it, since the common tag
    /// set stamped onto every metric cannot be formed.
    #[must_use]
    pub fn set_application_name<A>(mut self, app_name: A) -> Self
    where
        A: Into<String>,
    {
        self.app_name = Some(app_name.into());
        self
    }

    /// Supplies a backend configuration value from the host application's
    /// configuration source.
    ///
    /// Recognized keys (`graphite.host`, `graphite.port`, `graphite.protocol`,
    /// `graphite.step`) fall back to built-in defaults when not supplied; see
    /// [`GraphiteConfig`]. Values are relayed as opaque strings.
    #[must_use]
    pub fn set_config_value<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.set(key, value);
        self
    }

    /// Sets the quantiles to use when rendering histograms.
    ///
    /// Quantiles represent a scale of 0 to 1, where percentiles represent a scale of 1 to 100, so
    /// a quantile of 0.99 is the 99th percentile, and a quantile of 0.999 is the 99.9th percentile.
    ///
    /// Each quantile becomes one additional path level below the histogram's
    /// own path (`min`, `p50`, `max`, ...).
    ///
    /// Defaults to a hard-coded set of quantiles: 0.0, 0.5, 0.9, 0.95, 0.99, 0.999, and 1.0.
    ///
    /// ## Errors
    ///
    /// If `quantiles` is empty, an error variant will be thrown.
    pub fn set_quantiles(mut self, quantiles: &[f64]) -> Result<Self, BuildError> {
        if quantiles.is_empty() {
            return Err(BuildError::EmptyQuantiles);
        }

        self.quantiles = parse_quantiles(quantiles);
        Ok(self)
    }

    /// Sets the naming convention applied to every metric's name and tags
    /// before path construction.
    ///
    /// Defaults to [`IdentityNaming`], which passes names and tags through
    /// unchanged.
    #[must_use]
    pub fn set_naming_convention<N>(mut self, convention: N) -> Self
    where
        N: NamingConvention + Send + Sync + 'static,
    {
        self.convention = Arc::new(convention);
        self
    }

    /// Sets the idle timeout for metrics.
    ///
    /// If a metric hasn't been updated within this timeout, it will be removed from the registry.
    /// This behavior is driven by requests to generate rendered output, and so metrics will not be
    /// removed unless a flush has happened recently enough to prune the idle metrics.
    ///
    /// Further, the metric kind "mask" configures which metrics will be considered by the idle
    /// timeout.  If the kind of a metric being considered for idle timeout is not of a kind
    /// represented by the mask, it will not be affected, even if it would have otherwise been
    /// removed for exceeding the idle timeout.
    ///
    /// Refer to the documentation for [`MetricKindMask`](metrics_util::MetricKindMask) for more
    /// information on defining a metric kind mask.
    #[must_use]
    pub fn idle_timeout(mut self, mask: MetricKindMask, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self.recency_mask = if self.idle_timeout.is_none() {
            MetricKindMask::NONE
        } else {
            mask
        };
        self
    }

    /// Builds the recorder and exporter and installs them globally.
    ///
    /// When called from within a Tokio runtime, the exporter future is spawned directly
    /// into the runtime.  Otherwise, a new single-threaded Tokio runtime is created
    /// on a background thread, and the exporter is spawned there.
    ///
    /// ## Errors
    ///
    /// If there is an error while either building the recorder and exporter, or installing the
    /// recorder and exporter, an error variant will be returned describing the error.
    pub fn install(self) -> Result<(), BuildError> {
        let recorder = if let Ok(handle) = runtime::Handle::try_current() {
            let (recorder, exporter) = {
                let _g = handle.enter();
                self.build()?
            };

            handle.spawn(exporter);

            recorder
        } else {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

            let (recorder, exporter) = {
                let _g = runtime.enter();
                self.build()?
            };

            thread::Builder::new()
                .name("metrics-exporter-graphite-push".to_string())
                .spawn(move || runtime.block_on(exporter))
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

            recorder
        };

        metrics::set_global_recorder(recorder)
            .map_err(|e| BuildError::FailedToSetGlobalRecorder(e.to_string()))?;

        Ok(())
    }

    /// Builds the recorder and exporter and returns them both.
    ///
    /// In most cases, users should prefer to use [`install`][GraphiteBuilder::install] to create
    /// and install the recorder and exporter automatically for them.  If a caller is combining
    /// recorders, or needs to schedule the exporter to run in a particular way, this method, or
    /// [`build_recorder`][GraphiteBuilder::build_recorder], provide the flexibility to do so.
    ///
    /// The returned future connects to the carbon endpoint on every flush and
    /// writes the rendered plaintext payload; transport errors are logged and
    /// the next flush retries with a fresh connection.
    ///
    /// ## Errors
    ///
    /// If there is an error while building the recorder and exporter, an error variant will be
    /// returned describing the error.
    pub fn build(self) -> Result<(GraphiteRecorder, ExporterFuture), BuildError> {
        let endpoint = self.carbon_endpoint()?;
        let interval = self.push_interval()?;
        let recorder = self.build_recorder()?;
        let handle = recorder.handle();

        let exporter = async move {
            loop {
                // Sleep for one step interval, and then do a push.
                tokio::time::sleep(interval).await;

                let output = handle.render();
                if output.is_empty() {
                    continue;
                }
                match push_plaintext(&endpoint, output.as_bytes()).await {
                    Ok(_) => (),
                    Err(e) => error!("error pushing metrics to carbon endpoint: {:?}", e),
                }
            }
        };

        Ok((recorder, Box::pin(exporter)))
    }

    /// Builds the recorder and returns it.
    ///
    /// ## Errors
    ///
    /// If the environment name or application name is missing, an error
    /// variant will be returned: the common tag set cannot be formed without
    /// them.
    pub fn build_recorder(self) -> Result<GraphiteRecorder, BuildError> {
        self.build_with_clock(Clock::new())
    }

    pub(crate) fn build_with_clock(self, clock: Clock) -> Result<GraphiteRecorder, BuildError> {
        let environment = self
            .environment
            .ok_or(BuildError::MissingRequiredConfiguration("current.env"))?;
        let app_name = self
            .app_name
            .ok_or(BuildError::MissingRequiredConfiguration("application name"))?;
        let common_tags = CommonTags::new(environment, app_name)?;

        let inner = Inner {
            registry: Registry::new(GenerationalStorage::atomic()),
            recency: Recency::new(clock, self.recency_mask, self.idle_timeout),
            common_tags,
            convention: self.convention,
            quantiles: self.quantiles,
        };

        Ok(GraphiteRecorder::from(inner))
    }

    fn carbon_endpoint(&self) -> Result<SocketAddr, BuildError> {
        let protocol = self.config.get(config::PROTOCOL).unwrap_or_default();
        if protocol != "plaintext" {
            return Err(BuildError::InvalidConfigValue {
                key: config::PROTOCOL,
                reason: format!("unsupported protocol '{}', only 'plaintext' is supported", protocol),
            });
        }

        let host = self
            .config
            .get(config::HOST)
            .ok_or(BuildError::InvalidConfigValue {
                key: config::HOST,
                reason: "not set".to_string(),
            })?;
        let port: u16 = self
            .config
            .get(config::PORT)
            .unwrap_or_default()
            .parse()
            .map_err(|e: std::num::ParseIntError| BuildError::InvalidConfigValue {
                key: config::PORT,
                reason: e.to_string(),
            })?;

        (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| BuildError::InvalidEndpoint(e.to_string()))?
            .next() // just use the first address we resolve to
            .ok_or_else(|| {
                BuildError::InvalidEndpoint(
                    "to_socket_addrs returned an empty iterator".to_string(),
                )
            })
    }

    fn push_interval(&self) -> Result<Duration, BuildError> {
        let step: u64 = self
            .config
            .get(config::STEP)
            .unwrap_or_default()
            .parse()
            .map_err(|e: std::num::ParseIntError| BuildError::InvalidConfigValue {
                key: config::STEP,
                reason: e.to_string(),
            })?;
        if step == 0 {
            return Err(BuildError::InvalidConfigValue {
                key: config::STEP,
                reason: "step must be at least one second".to_string(),
            });
        }
        Ok(Duration::from_secs(step))
    }
}

impl Default for GraphiteBuilder {
    fn default() -> Self {
        GraphiteBuilder::new()
    }
}

// Carbon's plaintext listener accepts any number of newline-terminated lines
// per connection, so the whole rendered payload goes out over one connection
// per flush and the socket is closed afterwards.
async fn push_plaintext(endpoint: &SocketAddr, body: &[u8]) -> io::Result<()> {
    let mut stream = TcpStream::connect(endpoint).await?;
    stream.write_all(body).await?;
    stream.shutdown().await?;
    Ok(())
}
