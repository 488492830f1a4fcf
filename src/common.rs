use std::collections::HashMap;

use metrics_util::Summary;
use thiserror::Error;
use uuid::Uuid;

/// Errors that could occur while building or installing the recorder/exporter.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required startup configuration value was missing or empty.
    ///
    /// The common tag set cannot be formed without the deployment environment
    /// and the application name, so building the recorder fails outright.
    #[error("missing required configuration value: {0}")]
    MissingRequiredConfiguration(&'static str),

    /// The carbon endpoint resolved from the configuration was not valid.
    #[error("invalid carbon endpoint: {0}")]
    InvalidEndpoint(String),

    /// A recognized configuration key held a value that could not be interpreted.
    #[error("invalid value for configuration key '{key}': {reason}")]
    InvalidConfigValue { key: &'static str, reason: String },

    /// The set of quantiles to render for summaries was empty.
    #[error("quantiles cannot be empty")]
    EmptyQuantiles,

    /// Creating the runtime for the background exporter thread failed.
    #[error("failed to spawn Tokio runtime: {0}")]
    FailedToCreateRuntime(String),

    /// Installing the recorder as the global recorder failed.
    #[error("failed to install recorder: {0}")]
    FailedToSetGlobalRecorder(String),
}

/// The tags stamped onto every metric emitted by this process.
///
/// Constructed once at startup from the deployment environment name and the
/// application name, plus a freshly generated instance identifier. The order
/// is fixed (`env`, `appName`, `uuid`) and the set never changes afterwards;
/// every path computation for the process reads the same instance.
#[derive(Clone, Debug)]
pub struct CommonTags {
    tags: Vec<(String, String)>,
}

impl CommonTags {
    /// Creates the common tag set for this process.
    ///
    /// ## Errors
    ///
    /// If `environment` or `app_name` is empty, an error variant will be
    /// returned: the process must not start without them.
    pub fn new<E, A>(environment: E, app_name: A) -> Result<Self, BuildError>
    where
        E: Into<String>,
        A: Into<String>,
    {
        let environment = environment.into();
        if environment.is_empty() {
            return Err(BuildError::MissingRequiredConfiguration("current.env"));
        }
        let app_name = app_name.into();
        if app_name.is_empty() {
            return Err(BuildError::MissingRequiredConfiguration("application name"));
        }

        let tags = vec![
            ("env".to_string(), environment),
            ("appName".to_string(), app_name),
            ("uuid".to_string(), instance_uuid()),
        ];
        Ok(CommonTags { tags })
    }

    /// The tag keys, in construction order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(k, _)| k.as_str())
    }

    /// The (key, value) pairs, in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The generated per-instance identifier.
    pub fn instance_id(&self) -> &str {
        &self.tags[2].1
    }
}

fn instance_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Metrics drained from the registry for one render pass, keyed by their
/// rendered hierarchical path. Summaries carry the running sum of the samples
/// they absorbed this interval.
pub struct Snapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub summaries: HashMap<String, (Summary, f64)>,
}

#[cfg(test)]
mod tests {
    use super::{BuildError, CommonTags};

    #[test]
    fn common_tags_ordered_keys() {
        let tags = CommonTags::new("prod", "orders").unwrap();
        let keys: Vec<&str> = tags.keys().collect();
        assert_eq!(keys, ["env", "appName", "uuid"]);

        let pairs: Vec<(&str, &str)> = tags.iter().collect();
        assert_eq!(pairs[0], ("env", "prod"));
        assert_eq!(pairs[1], ("appName", "orders"));
        assert_eq!(pairs[2].0, "uuid");
        assert!(!pairs[2].1.is_empty());
    }

    #[test]
    fn instance_id_differs_across_initializations() {
        let first = CommonTags::new("prod", "orders").unwrap();
        let second = CommonTags::new("prod", "orders").unwrap();
        assert_ne!(first.instance_id(), second.instance_id());
    }

    #[test]
    fn missing_environment_is_fatal() {
        let result = CommonTags::new("", "orders");
        assert!(matches!(
            result,
            Err(BuildError::MissingRequiredConfiguration("current.env"))
        ));
    }

    #[test]
    fn missing_app_name_is_fatal() {
        let result = CommonTags::new("prod", "");
        assert!(matches!(
            result,
            Err(BuildError::MissingRequiredConfiguration(_))
        ));
    }
}
