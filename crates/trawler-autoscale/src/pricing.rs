//! Hourly instance pricing for run cost accrual.

use std::collections::HashMap;

/// On-demand hourly USD rates by instance type.
///
/// Feeds the run cost estimate only; sizing never looks at price.
pub struct PricingTable {
    hourly: HashMap<String, f64>,
}

impl PricingTable {
    /// The burstable and small general-purpose types a scraping fleet
    /// actually runs on. Anything else comes in through `[pricing]`
    /// overrides in trawler.toml.
    pub fn builtin() -> Self {
        let mut hourly = HashMap::new();
        for (instance_type, rate) in [
            ("t2.nano", 0.0058),
            ("t2.micro", 0.0116),
            ("t2.small", 0.023),
            ("t2.medium", 0.0464),
            ("t3.nano", 0.0052),
            ("t3.micro", 0.0104),
            ("t3.small", 0.0208),
            ("t3.medium", 0.0416),
            ("m5.large", 0.096),
        ] {
            hourly.insert(instance_type.to_string(), rate);
        }
        Self { hourly }
    }

    /// Builtin table with config overrides folded in on top.
    pub fn with_overrides(overrides: &HashMap<String, f64>) -> Self {
        let mut table = Self::builtin();
        for (instance_type, rate) in overrides {
            table.hourly.insert(instance_type.clone(), *rate);
        }
        table
    }

    /// Hourly rate for the type; `None` when the table has no entry.
    pub fn hourly_rate(&self, instance_type: &str) -> Option<f64> {
        self.hourly.get(instance_type).copied()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_knows_the_default_type() {
        let table = PricingTable::builtin();
        assert_eq!(table.hourly_rate("t2.small"), Some(0.023));
        assert_eq!(table.hourly_rate("p4d.24xlarge"), None);
    }

    #[test]
    fn overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("t2.small".to_string(), 0.5);
        overrides.insert("z1d.large".to_string(), 0.186);

        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.hourly_rate("t2.small"), Some(0.5));
        assert_eq!(table.hourly_rate("z1d.large"), Some(0.186));
        // untouched entries survive
        assert_eq!(table.hourly_rate("t3.micro"), Some(0.0104));
    }
}
