//! Guest OS policy: which adapter a machine should use and whether its
//! virtual hardware should be pinned.
//!
//! Both decisions are driven by ordered rule tables. Rules overlap on purpose
//! (a broad Windows rule follows narrower legacy rules), so evaluation is
//! strictly first-match-wins in declaration order. The adapter table and the
//! pinning table are independent of each other.
//!
//! # Examples
//!
//! ```ignore
//! use vmxtune::services::PolicyEngine;
//!
//! let policy = PolicyEngine::new(AdapterType::E1000);
//! assert_eq!(policy.classify("windows9-64"), AdapterType::Vmxnet3);
//! assert!(policy.pinning_for("win98").is_some());
//! ```

use crate::models::AdapterType;
use regex::Regex;

/// Hardware compatibility key
pub const HW_VERSION_KEY: &str = "virtualHW.version";

/// Tools upgrade policy key, always pinned together with [`HW_VERSION_KEY`]
pub const UPGRADE_POLICY_KEY: &str = "tools.upgrade.policy";

/// Value that disables automatic tools upgrades
pub const MANUAL_UPGRADE_POLICY: &str = "manual";

/// A pattern and what it recommends
#[derive(Debug, Clone)]
pub struct Rule<T> {
    pub pattern: Regex,
    pub recommendation: T,
}

impl<T> Rule<T> {
    /// Compile a case-insensitive rule.
    pub fn new(pattern: &str, recommendation: T) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!("(?i){}", pattern))?,
            recommendation,
        })
    }
}

/// Hardware pin: a fixed compatibility level plus its companion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwarePin {
    pub hardware_version: String,
    pub upgrade_policy: String,
}

impl HardwarePin {
    fn version(version: &str) -> Self {
        Self {
            hardware_version: version.to_string(),
            upgrade_policy: MANUAL_UPGRADE_POLICY.to_string(),
        }
    }

    /// The (key, value) settings this pin requires, version first.
    pub fn settings(&self) -> [(&'static str, &str); 2] {
        [
            (HW_VERSION_KEY, self.hardware_version.as_str()),
            (UPGRADE_POLICY_KEY, self.upgrade_policy.as_str()),
        ]
    }
}

/// Ordered guest OS rule tables
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    adapter_rules: Vec<Rule<AdapterType>>,
    pinning_rules: Vec<Rule<HardwarePin>>,
    baseline: AdapterType,
}

impl PolicyEngine {
    /// Create the engine with the built-in rule tables.
    pub fn new(baseline: AdapterType) -> Self {
        // Order is significant: narrower legacy rules precede the broad Windows rule.
        let adapter_table: [(&str, AdapterType); 6] = [
            (r"^win(31|95|98|me|nt)", AdapterType::Vlance),
            (r"^win(2000|xp|net)", AdapterType::E1000),
            (r"^(windows7|windows8|winvista|longhorn)", AdapterType::E1000e),
            (r"^win", AdapterType::Vmxnet3),
            (
                r"ubuntu|debian|rhel|centos|fedora|suse|sles|linux|freebsd",
                AdapterType::Vmxnet3,
            ),
            (r"darwin", AdapterType::E1000e),
        ];
        let pinning_table: [(&str, &str); 2] = [
            (r"^win(31|95|98|me)", "8"),
            (r"^win(nt|2000|xp|net)", "10"),
        ];

        let adapter_rules = adapter_table
            .into_iter()
            .map(|(pattern, adapter)| Rule::new(pattern, adapter).expect("Invalid adapter rule"))
            .collect();
        let pinning_rules = pinning_table
            .into_iter()
            .map(|(pattern, version)| {
                Rule::new(pattern, HardwarePin::version(version)).expect("Invalid pinning rule")
            })
            .collect();

        Self::with_rules(adapter_rules, pinning_rules, baseline)
    }

    /// Create an engine from explicit rule tables.
    pub fn with_rules(
        adapter_rules: Vec<Rule<AdapterType>>,
        pinning_rules: Vec<Rule<HardwarePin>>,
        baseline: AdapterType,
    ) -> Self {
        Self {
            adapter_rules,
            pinning_rules,
            baseline,
        }
    }

    /// Recommended adapter for a guest OS; the baseline when no rule matches.
    pub fn classify(&self, guest_os: &str) -> AdapterType {
        match first_match(&self.adapter_rules, guest_os) {
            Some(adapter) => *adapter,
            None => {
                tracing::debug!(
                    "No adapter rule for guest OS {}, using baseline {}",
                    guest_os,
                    self.baseline
                );
                self.baseline
            }
        }
    }

    /// Hardware pin for a guest OS, if any pinning rule matches.
    pub fn pinning_for(&self, guest_os: &str) -> Option<&HardwarePin> {
        first_match(&self.pinning_rules, guest_os)
    }

    pub fn baseline(&self) -> AdapterType {
        self.baseline
    }
}

fn first_match<'a, T>(rules: &'a [Rule<T>], guest_os: &str) -> Option<&'a T> {
    rules
        .iter()
        .find(|rule| rule.pattern.is_match(guest_os))
        .map(|rule| &rule.recommendation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_GUEST_OS;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(AdapterType::E1000)
    }

    #[test]
    fn test_modern_windows_gets_vmxnet3() {
        assert_eq!(engine().classify("windows10-64"), AdapterType::Vmxnet3);
        assert_eq!(engine().classify("windows9-64"), AdapterType::Vmxnet3);
        assert_eq!(engine().classify("windows2019srv-64"), AdapterType::Vmxnet3);
    }

    #[test]
    fn test_legacy_windows_families() {
        let policy = engine();
        assert_eq!(policy.classify("win95"), AdapterType::Vlance);
        assert_eq!(policy.classify("WINNT"), AdapterType::Vlance);
        assert_eq!(policy.classify("winxppro"), AdapterType::E1000);
        assert_eq!(policy.classify("windows7-64"), AdapterType::E1000e);
    }

    #[test]
    fn test_linux_and_darwin() {
        let policy = engine();
        assert_eq!(policy.classify("ubuntu-64"), AdapterType::Vmxnet3);
        assert_eq!(policy.classify("other5xlinux-64"), AdapterType::Vmxnet3);
        assert_eq!(policy.classify("darwin21-64"), AdapterType::E1000e);
    }

    #[test]
    fn test_unknown_guest_is_safe_default() {
        let policy = engine();
        assert_eq!(policy.classify(UNKNOWN_GUEST_OS), AdapterType::E1000);
        assert!(policy.pinning_for(UNKNOWN_GUEST_OS).is_none());
        assert_eq!(policy.classify("solaris11-64"), policy.baseline());
    }

    #[test]
    fn test_first_match_wins_regardless_of_specificity() {
        // Broad rule declared first shadows the narrower one.
        let policy = PolicyEngine::with_rules(
            vec![
                Rule::new("^win", AdapterType::Vmxnet3).unwrap(),
                Rule::new("^winxp", AdapterType::E1000).unwrap(),
            ],
            Vec::new(),
            AdapterType::Vlance,
        );
        assert_eq!(policy.classify("winxppro"), AdapterType::Vmxnet3);

        // Built-in table: narrow legacy rule precedes the broad Windows rule.
        assert_eq!(engine().classify("winxppro"), AdapterType::E1000);
    }

    #[test]
    fn test_pinning_is_independent_of_adapter_rules() {
        let policy = engine();

        let pin = policy.pinning_for("win98").unwrap();
        assert_eq!(pin.hardware_version, "8");
        assert_eq!(pin.upgrade_policy, MANUAL_UPGRADE_POLICY);

        let pin = policy.pinning_for("winxppro").unwrap();
        assert_eq!(pin.hardware_version, "10");

        assert!(policy.pinning_for("windows9-64").is_none());
        assert!(policy.pinning_for("windows7").is_none());
    }

    #[test]
    fn test_pin_settings_order() {
        let pin = HardwarePin::version("8");
        let settings = pin.settings();
        assert_eq!(settings[0], (HW_VERSION_KEY, "8"));
        assert_eq!(settings[1], (UPGRADE_POLICY_KEY, "manual"));
    }
}
