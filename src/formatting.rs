use indexmap::IndexMap;
use metrics::Key;

use crate::common::CommonTags;
use crate::naming::NamingConvention;

// <COMMON_TAG_VALUES...>.<METRIC_NAME>.<REMAINING_TAG_VALUES...> <VALUE> <EPOCH_SECS>
//
// Graphite's plaintext protocol has no tag syntax of its own, so tag values are
// folded into the dot-separated path: values of tags whose keys match the
// process-wide common tag set come first (in the common set's fixed order),
// then the metric name, then the values of the metric's remaining tags in
// their own order.
pub fn key_to_path(
    key: &Key,
    common_tags: &CommonTags,
    convention: &dyn NamingConvention,
) -> String {
    let mut tags = IndexMap::new();
    for (tag_key, tag_value) in common_tags.iter() {
        tags.insert(convention.tag_key(tag_key), convention.tag_value(tag_value));
    }
    // The metric's own tags win on key collision, but keep the common tag's
    // position so the hierarchy stays stable.
    key.labels().for_each(|label| {
        tags.insert(
            convention.tag_key(label.key()),
            convention.tag_value(label.value()),
        );
    });

    let common_keys: Vec<&str> = common_tags.keys().collect();
    hierarchical_path(&common_keys, &convention.name(key.name()), &tags)
}

/// Builds the dot-separated hierarchical path for one metric.
///
/// Common-tag keys are looked up in order against the converted tag set; a key
/// the metric does not carry is silently skipped, producing a shorter path
/// rather than a placeholder segment. The metric name is appended unsanitized,
/// followed by the sanitized values of every non-common tag in the tag set's
/// own iteration order. Tags consumed by the common pass are never repeated.
pub fn hierarchical_path(
    common_keys: &[&str],
    name: &str,
    tags: &IndexMap<String, String>,
) -> String {
    let mut segments = Vec::with_capacity(tags.len() + 1);
    for key in common_keys {
        if let Some(value) = tags.get(*key) {
            segments.push(sanitize_tag_value(value));
        }
    }
    segments.push(name.to_string());
    for (key, value) in tags {
        if !common_keys.contains(&key.as_str()) {
            segments.push(sanitize_tag_value(value));
        }
    }
    segments.join(".")
}

/// Sanitizes a tag value before it becomes a path segment.
///
/// `{`, `}`, and spaces are replaced with `_`; everything else passes through.
/// Applied to tag values only, never to the metric name.
pub fn sanitize_tag_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '{' || c == '}' || c == ' ' { '_' } else { c })
        .collect()
}

/// Sanitizes a statistic suffix (quantile label, `sum`, `count`, ...) so it
/// occupies exactly one path level.
pub fn sanitize_statistic_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if invalid_segment_character(c) {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Writes one Graphite plaintext line: `<path>[.<suffix>] <value> <timestamp>`.
pub fn write_plaintext_line<T>(
    buffer: &mut String,
    path: &str,
    suffix: Option<&str>,
    value: T,
    timestamp: u64,
) where
    T: std::fmt::Display,
{
    buffer.push_str(path);

    if let Some(suf) = suffix {
        buffer.push('.');
        buffer.push_str(sanitize_statistic_segment(suf).as_str());
    }

    buffer.push(' ');
    buffer.push_str(value.to_string().as_str());
    buffer.push(' ');
    buffer.push_str(timestamp.to_string().as_str());
    buffer.push('\n');
}

#[inline]
fn invalid_segment_character(c: char) -> bool {
    // Essentially, needs to match the regex pattern of [a-zA-Z0-9_].
    !(c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use metrics::{Key, Label};

    use super::{
        hierarchical_path, key_to_path, sanitize_statistic_segment, sanitize_tag_value,
        write_plaintext_line,
    };
    use crate::common::CommonTags;
    use crate::naming::{IdentityNaming, LowercaseNaming};

    const COMMON_KEYS: [&str; 3] = ["env", "appName", "uuid"];

    fn tag_map(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn partial_common_overlap() {
        let tags = tag_map(&[("env", "prod"), ("region", "us-east")]);
        let path = hierarchical_path(&COMMON_KEYS, "latency", &tags);
        assert_eq!(path, "prod.latency.us-east");
    }

    #[test]
    fn metric_name_is_not_sanitized() {
        let tags = IndexMap::new();
        let path = hierarchical_path(&COMMON_KEYS, "cpu{usage}", &tags);
        assert_eq!(path, "cpu{usage}");
    }

    #[test]
    fn sanitize_replaces_braces_and_spaces() {
        assert_eq!(sanitize_tag_value("us east {zone}"), "us_east__zone_");
        assert_eq!(sanitize_tag_value("plain-value:ok"), "plain-value:ok");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_tag_value("a {b} c");
        let twice = sanitize_tag_value(&once);
        assert_eq!(once, "a__b__c");
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_tag_value_keeps_its_segment() {
        let tags = tag_map(&[("uuid", ""), ("region", "us-east")]);
        let path = hierarchical_path(&COMMON_KEYS, "latency", &tags);
        assert_eq!(path, ".latency.us-east");
    }

    #[test]
    fn common_segments_precede_name_regardless_of_tag_order() {
        let reversed = tag_map(&[
            ("region", "us-east"),
            ("uuid", "abc-123"),
            ("appName", "orders"),
            ("env", "prod"),
        ]);
        let path = hierarchical_path(&COMMON_KEYS, "latency", &reversed);
        assert_eq!(path, "prod.orders.abc-123.latency.us-east");
    }

    #[test]
    fn common_keys_are_never_repeated() {
        let tags = tag_map(&[("env", "prod"), ("region", "us-east"), ("appName", "orders")]);
        let path = hierarchical_path(&COMMON_KEYS, "latency", &tags);
        assert_eq!(path, "prod.orders.latency.us-east");
        assert_eq!(path.matches("prod").count(), 1);
        assert_eq!(path.matches("orders").count(), 1);
    }

    #[test]
    fn no_tags_degenerates_to_name() {
        let path = hierarchical_path(&COMMON_KEYS, "latency", &IndexMap::new());
        assert_eq!(path, "latency");
    }

    #[test]
    fn builder_is_deterministic() {
        let tags = tag_map(&[("env", "prod"), ("zone", "a b")]);
        let first = hierarchical_path(&COMMON_KEYS, "latency", &tags);
        let second = hierarchical_path(&COMMON_KEYS, "latency", &tags);
        assert_eq!(first, second);
    }

    #[test]
    fn key_to_path_stamps_common_tags() {
        let common = CommonTags::new("prod", "orders").unwrap();
        let key = Key::from_parts("latency", vec![Label::new("region", "us-east")]);
        let path = key_to_path(&key, &common, &IdentityNaming);
        assert_eq!(
            path,
            format!("prod.orders.{}.latency.us-east", common.instance_id())
        );
    }

    #[test]
    fn metric_tag_overrides_common_value_in_place() {
        let common = CommonTags::new("prod", "orders").unwrap();
        let key = Key::from_parts("latency", vec![Label::new("env", "staging")]);
        let path = key_to_path(&key, &common, &IdentityNaming);
        assert_eq!(
            path,
            format!("staging.orders.{}.latency", common.instance_id())
        );
    }

    #[test]
    fn convention_applies_before_path_construction() {
        let common = CommonTags::new("PROD", "Orders").unwrap();
        let key = Key::from_parts("HTTP.Requests", vec![Label::new("Region", "US-East")]);
        let path = key_to_path(&key, &common, &LowercaseNaming);
        // A convention that rewrites tag keys moves the affected common tags
        // out of the common pass: "appName" no longer matches its converted
        // key, so that value trails the metric name instead. "env" and "uuid"
        // are already lowercase and keep their leading positions.
        assert_eq!(
            path,
            format!(
                "prod.{}.http.requests.orders.us-east",
                common.instance_id()
            )
        );
    }

    #[test]
    fn statistic_segments_stay_on_one_level() {
        assert_eq!(sanitize_statistic_segment("p99"), "p99");
        assert_eq!(sanitize_statistic_segment("0.999"), "0_999");
        assert_eq!(sanitize_statistic_segment("+Inf"), "_Inf");
    }

    #[test]
    fn plaintext_line_layout() {
        let mut buffer = String::new();
        write_plaintext_line(&mut buffer, "prod.latency", None, 42u64, 1000);
        write_plaintext_line(&mut buffer, "prod.latency", Some("p99"), 3.5f64, 1000);
        assert_eq!(buffer, "prod.latency 42 1000\nprod.latency.p99 3.5 1000\n");
    }
}
