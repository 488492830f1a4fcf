/// Strategy for converting a metric's logical name and tags into the textual
/// form sent to the backend.
///
/// The conversion runs before hierarchical path construction, over the metric
/// name, every tag key, and every tag value (common tags included). Value
/// sanitization is separate and always applied afterwards, so a convention
/// does not need to worry about characters Graphite cannot accept.
pub trait NamingConvention {
    /// Converts a metric name.
    fn name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Converts a tag key.
    fn tag_key(&self, key: &str) -> String {
        key.to_string()
    }

    /// Converts a tag value.
    fn tag_value(&self, value: &str) -> String {
        value.to_string()
    }
}

/// The passthrough convention: names and tags are emitted exactly as recorded.
///
/// This is the default, matching backends that expect the application to have
/// full control over its metric namespace.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityNaming;

impl NamingConvention for IdentityNaming {}

/// ASCII-lowercases names, tag keys, and tag values.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowercaseNaming;

impl NamingConvention for LowercaseNaming {
    fn name(&self, name: &str) -> String {
        name.to_ascii_lowercase()
    }

    fn tag_key(&self, key: &str) -> String {
        key.to_ascii_lowercase()
    }

    fn tag_value(&self, value: &str) -> String {
        value.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityNaming, LowercaseNaming, NamingConvention};

    #[test]
    fn identity_passes_everything_through() {
        let convention = IdentityNaming;
        assert_eq!(convention.name("Http.Requests"), "Http.Requests");
        assert_eq!(convention.tag_key("appName"), "appName");
        assert_eq!(convention.tag_value("us-EAST"), "us-EAST");
    }

    #[test]
    fn lowercase_converts_all_parts() {
        let convention = LowercaseNaming;
        assert_eq!(convention.name("Http.Requests"), "http.requests");
        assert_eq!(convention.tag_key("appName"), "appname");
        assert_eq!(convention.tag_value("us-EAST"), "us-east");
    }
}
