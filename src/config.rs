use std::collections::HashMap;

/// Configuration keys recognized by the exporter, with their built-in defaults.
pub const HOST: &str = "graphite.host";
pub const PORT: &str = "graphite.port";
pub const PROTOCOL: &str = "graphite.protocol";
pub const STEP: &str = "graphite.step";

/// Key/value configuration for the carbon endpoint, resolved against the
/// values the host application supplies, falling back to the exporter's
/// built-in defaults.
///
/// Values are relayed as opaque strings; only the builder interprets the
/// recognized keys when assembling the exporter.
#[derive(Clone, Debug, Default)]
pub struct GraphiteConfig {
    overrides: HashMap<String, String>,
}

impl GraphiteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies a value from the host application's configuration source.
    ///
    /// Calling this again with the same key replaces the previous value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides.insert(key.into(), value.into());
    }

    /// Resolves a configuration key.
    ///
    /// The host-supplied value wins; absent that, the built-in default for the
    /// key is used. Returns `None` only when the key is unrecognized and the
    /// host never supplied it.
    pub fn get(&self, key: &str) -> Option<String> {
        self.overrides
            .get(key)
            .cloned()
            .or_else(|| default_value(key).map(str::to_string))
    }
}

fn default_value(key: &str) -> Option<&'static str> {
    match key {
        HOST => Some("localhost"),
        PORT => Some("2003"),
        PROTOCOL => Some("plaintext"),
        // seconds between pushes to the carbon endpoint
        STEP => Some("10"),
        _ => None,
    }
}
