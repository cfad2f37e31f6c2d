//! Gauge sink and in-memory registry
//!
//! The collector writes through [`MetricsSink`]; [`GaugeRegistry`] is the
//! implementation the daemon serves in the Prometheus text format.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Instantaneous power in watts
pub const POWER_ACTUAL: &str = "power_actual";

/// Accumulated energy in watt-hours
pub const POWER_COUNTER: &str = "power_counter";

const POWER_ACTUAL_HELP: &str = "Current real AC power being drawn (or injected), in Watts";
const POWER_COUNTER_HELP: &str = "Total real AC power being drawn (or injected), in Watt Hours";

/// Label set shared by every exported series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GaugeLabels {
    pub room: String,
    pub device_label: String,
    pub device_type: String,
}

impl GaugeLabels {
    pub fn new(
        room: impl Into<String>,
        device_label: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            device_label: device_label.into(),
            device_type: device_type.into(),
        }
    }

    fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("room", &self.room),
            ("device_label", &self.device_label),
            ("device_type", &self.device_type),
        ]
    }
}

/// Destination for gauge values
pub trait MetricsSink: Send + Sync {
    /// Set the series identified by `name` and `labels` to `value`
    fn set_gauge(&self, name: &str, labels: &GaugeLabels, value: f64);
}

#[derive(Debug, Default)]
struct GaugeFamily {
    help: Option<String>,
    series: BTreeMap<GaugeLabels, f64>,
}

/// Thread-safe gauge store with Prometheus text rendering
#[derive(Debug)]
pub struct GaugeRegistry {
    namespace: String,
    families: RwLock<BTreeMap<String, GaugeFamily>>,
}

impl GaugeRegistry {
    /// Registry with the power gauges pre-registered under `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        let registry = Self {
            namespace: namespace.into(),
            families: RwLock::new(BTreeMap::new()),
        };
        registry.register(POWER_ACTUAL, POWER_ACTUAL_HELP);
        registry.register(POWER_COUNTER, POWER_COUNTER_HELP);
        registry
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Declare a gauge and its help text
    pub fn register(&self, name: &str, help: &str) {
        let mut families = self.families.write();
        families.entry(name.to_string()).or_default().help = Some(help.to_string());
    }

    /// Current value of a series
    pub fn value(&self, name: &str, labels: &GaugeLabels) -> Option<f64> {
        self.families.read().get(name)?.series.get(labels).copied()
    }

    /// Number of series stored for a gauge
    pub fn series_count(&self, name: &str) -> usize {
        self.families.read().get(name).map_or(0, |f| f.series.len())
    }

    fn full_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    /// Render all gauges in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let families = self.families.read();
        let mut output = String::new();

        for (name, family) in families.iter() {
            let full_name = self.full_name(name);
            if let Some(help) = &family.help {
                let _ = writeln!(output, "# HELP {} {}", full_name, help);
            }
            let _ = writeln!(output, "# TYPE {} gauge", full_name);

            for (labels, value) in &family.series {
                let labels_str = labels
                    .pairs()
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                    .collect::<Vec<_>>()
                    .join(",");
                let _ = writeln!(output, "{}{{{}}} {}", full_name, labels_str, format_value(*value));
            }
        }

        output
    }
}

impl Default for GaugeRegistry {
    fn default() -> Self {
        Self::new("shelly")
    }
}

impl MetricsSink for GaugeRegistry {
    fn set_gauge(&self, name: &str, labels: &GaugeLabels, value: f64) {
        let mut families = self.families.write();
        families
            .entry(name.to_string())
            .or_default()
            .series
            .insert(labels.clone(), value);
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read_gauge() {
        let registry = GaugeRegistry::new("shelly");
        let labels = GaugeLabels::new("Kitchen", "Lamp", "SHPLG-S");

        assert_eq!(registry.value(POWER_ACTUAL, &labels), None);
        registry.set_gauge(POWER_ACTUAL, &labels, 42.0);
        registry.set_gauge(POWER_ACTUAL, &labels, 43.5);

        assert_eq!(registry.value(POWER_ACTUAL, &labels), Some(43.5));
        assert_eq!(registry.series_count(POWER_ACTUAL), 1);
        assert_eq!(registry.series_count(POWER_COUNTER), 0);
    }

    #[test]
    fn test_render_text_format() {
        let registry = GaugeRegistry::new("shelly");
        registry.set_gauge(POWER_ACTUAL, &GaugeLabels::new("Kitchen", "Lamp", "SHPLG-S"), 42.0);
        registry.set_gauge(POWER_COUNTER, &GaugeLabels::new("Kitchen", "Lamp", "SHPLG-S"), 10.0);

        let text = registry.render();
        assert!(text.contains(
            "# HELP shelly_power_actual Current real AC power being drawn (or injected), in Watts\n"
        ));
        assert!(text.contains("# TYPE shelly_power_actual gauge\n"));
        assert!(text.contains(
            "shelly_power_actual{room=\"Kitchen\",device_label=\"Lamp\",device_type=\"SHPLG-S\"} 42\n"
        ));
        assert!(text.contains(
            "shelly_power_counter{room=\"Kitchen\",device_label=\"Lamp\",device_type=\"SHPLG-S\"} 10\n"
        ));
    }

    #[test]
    fn test_render_non_finite_values() {
        let registry = GaugeRegistry::new("shelly");
        registry.set_gauge(POWER_ACTUAL, &GaugeLabels::new("a", "up", "t"), f64::INFINITY);
        registry.set_gauge(POWER_ACTUAL, &GaugeLabels::new("b", "down", "t"), f64::NEG_INFINITY);
        registry.set_gauge(POWER_ACTUAL, &GaugeLabels::new("c", "none", "t"), f64::NAN);

        let text = registry.render();
        assert!(text.contains("device_label=\"up\",device_type=\"t\"} +Inf\n"));
        assert!(text.contains("device_label=\"down\",device_type=\"t\"} -Inf\n"));
        assert!(text.contains("device_label=\"none\",device_type=\"t\"} NaN\n"));
        assert!(!text.contains(" inf"));
    }

    #[test]
    fn test_render_escapes_labels() {
        let registry = GaugeRegistry::new("");
        registry.set_gauge(POWER_ACTUAL, &GaugeLabels::new("A \"B\"", "C\\D", "E\nF"), 1.5);

        let text = registry.render();
        assert!(text.contains(
            "power_actual{room=\"A \\\"B\\\"\",device_label=\"C\\\\D\",device_type=\"E\\nF\"} 1.5\n"
        ));
    }
}
