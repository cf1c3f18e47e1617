use crate::models::{AdapterType, Settings, VmxFile};
use crate::services::policy::PolicyEngine;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// Time synchronization key and its enabled value
pub const TIME_SYNC_KEY: &str = "tools.syncTime";
pub const TIME_SYNC_ENABLED: &str = "TRUE";

/// A single proposed key change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub key: String,
    pub current: Option<String>,
    pub new_value: String,
}

impl fmt::Display for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.current {
            Some(current) => write!(f, "{}: \"{}\" -> \"{}\"", self.key, current, self.new_value),
            None => write!(f, "{}: <missing> -> \"{}\"", self.key, self.new_value),
        }
    }
}

/// Ordered set of changes for one file; each key appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePlan {
    changes: IndexMap<String, PendingChange>,
}

impl ChangePlan {
    /// Add a change. A key already in the plan keeps its first proposal.
    fn propose(&mut self, key: &str, current: Option<String>, new_value: &str) {
        self.changes
            .entry(key.to_string())
            .or_insert_with(|| PendingChange {
                key: key.to_string(),
                current,
                new_value: new_value.to_string(),
            });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.values()
    }

    pub fn get(&self, key: &str) -> Option<&PendingChange> {
        self.changes.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }
}

/// Computes the difference between a file and the policy for its guest OS.
///
/// Planning is a pure read: the file is never mutated. The output order is
/// fixed: adapter changes by ascending index, then the hardware pin pair,
/// then the time sync flag.
pub struct ChangePlanner {
    policy: PolicyEngine,
    implicit_defaults: IndexMap<String, AdapterType>,
    adapter_key_pattern: Regex,
}

impl ChangePlanner {
    pub fn new(policy: PolicyEngine, settings: &Settings) -> Self {
        Self {
            policy,
            implicit_defaults: settings.implicit_adapter_defaults.clone(),
            adapter_key_pattern: Regex::new(r"^ethernet(\d+)\.").expect("Invalid adapter key regex"),
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Adapter the engine uses when `ethernetN.virtualDev` is absent
    /// (case-insensitive exact match on the guest OS).
    pub fn implicit_adapter(&self, guest_os: &str) -> Option<AdapterType> {
        self.implicit_defaults
            .iter()
            .find(|(guest, _)| guest.eq_ignore_ascii_case(guest_os))
            .map(|(_, adapter)| *adapter)
    }

    /// Adapter indices referenced by any `ethernetN.<attribute>` key, ascending.
    pub fn adapter_indices(&self, file: &VmxFile) -> Vec<u32> {
        file.keys()
            .filter_map(|key| self.adapter_key_pattern.captures(key))
            .filter_map(|captures| captures[1].parse::<u32>().ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn plan(&self, file: &VmxFile) -> ChangePlan {
        let mut plan = ChangePlan::default();

        let indices = self.adapter_indices(file);
        if indices.is_empty() {
            tracing::debug!("{} has no network adapters, nothing to plan", file.path());
            return plan;
        }

        let guest_os = file.guest_os();
        let recommended = self.policy.classify(guest_os);

        for index in indices {
            let key = format!("ethernet{}.virtualDev", index);
            let explicit = file.get(&key);
            let effective = explicit.clone().or_else(|| {
                self.implicit_adapter(guest_os)
                    .map(|adapter| adapter.as_str().to_string())
            });

            let compliant = effective
                .as_deref()
                .is_some_and(|current| current.eq_ignore_ascii_case(recommended.as_str()));
            if !compliant {
                plan.propose(&key, explicit, recommended.as_str());
            }
        }

        if let Some(pin) = self.policy.pinning_for(guest_os) {
            let settings = pin.settings();
            let deviates = settings
                .iter()
                .any(|(key, value)| file.get(key).as_deref() != Some(*value));
            if deviates {
                for (key, value) in settings {
                    plan.propose(key, file.get(key), value);
                }
            }
        }

        let time_sync = file.get(TIME_SYNC_KEY);
        let synced = time_sync
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case(TIME_SYNC_ENABLED));
        if !synced {
            plan.propose(TIME_SYNC_KEY, time_sync, TIME_SYNC_ENABLED);
        }

        tracing::debug!(
            "Planned {} change(s) for {} (guest OS {})",
            plan.len(),
            file.path(),
            guest_os
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::policy::{HW_VERSION_KEY, UPGRADE_POLICY_KEY};
    use camino::Utf8Path;
    use proptest::prelude::*;

    fn planner() -> ChangePlanner {
        let settings = Settings::default();
        ChangePlanner::new(PolicyEngine::new(settings.baseline_adapter), &settings)
    }

    fn plan_for(content: &str) -> ChangePlan {
        planner().plan(&VmxFile::parse(Utf8Path::new("/vms/t.vmx"), content))
    }

    fn apply(content: &str, plan: &ChangePlan) -> String {
        let mut file = VmxFile::parse(Utf8Path::new("/vms/t.vmx"), content);
        for change in plan.iter() {
            file.set(&change.key, &change.new_value);
        }
        String::from_utf8(file.serialize()).unwrap()
    }

    #[test]
    fn test_windows10_e1000_becomes_vmxnet3() {
        let plan = plan_for(
            "guestOS = \"windows10-64\"\n\
             ethernet0.virtualDev = \"e1000\"\n\
             tools.syncTime = \"TRUE\"\n",
        );

        let changes: Vec<_> = plan.iter().collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, "ethernet0.virtualDev");
        assert_eq!(changes[0].current.as_deref(), Some("e1000"));
        assert_eq!(changes[0].new_value, "vmxnet3");
    }

    #[test]
    fn test_implicit_default_already_compliant() {
        let plan = plan_for(
            "guestOS = \"win95\"\n\
             ethernet0.present = \"TRUE\"\n\
             virtualHW.version = \"8\"\n\
             tools.upgrade.policy = \"manual\"\n\
             tools.syncTime = \"TRUE\"\n",
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_missing_adapter_without_implicit_default() {
        let plan = plan_for(
            "guestOS = \"windows9-64\"\n\
             ethernet0.present = \"TRUE\"\n",
        );
        let change = plan.get("ethernet0.virtualDev").unwrap();
        assert_eq!(change.current, None);
        assert_eq!(change.new_value, "vmxnet3");
    }

    #[test]
    fn test_implicit_adapter_lookup_is_case_insensitive() {
        let planner = planner();
        assert_eq!(planner.implicit_adapter("win95"), Some(AdapterType::Vlance));
        assert_eq!(planner.implicit_adapter("WinXPPro"), Some(AdapterType::Vlance));
        assert_eq!(planner.implicit_adapter("windows9-64"), None);
    }

    #[test]
    fn test_no_adapters_short_circuits() {
        let plan = plan_for("guestOS = \"win98\"\nmemsize = \"64\"\n");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_adapter_indices_deduplicated_ascending() {
        let planner = planner();
        let file = VmxFile::parse(
            Utf8Path::new("/vms/t.vmx"),
            "ethernet10.present = \"TRUE\"\n\
             ethernet2.present = \"TRUE\"\n\
             ethernet2.virtualDev = \"e1000\"\n\
             ethernet0.connectionType = \"nat\"\n\
             ethernetX.bogus = \"1\"\n",
        );
        assert_eq!(planner.adapter_indices(&file), vec![0, 2, 10]);
    }

    #[test]
    fn test_output_order_adapters_then_pin_then_sync() {
        let plan = plan_for(
            "guestOS = \"winxppro\"\n\
             ethernet1.virtualDev = \"vlance\"\n\
             ethernet0.virtualDev = \"vmxnet3\"\n\
             virtualHW.version = \"16\"\n",
        );
        let keys: Vec<&str> = plan.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "ethernet0.virtualDev",
                "ethernet1.virtualDev",
                HW_VERSION_KEY,
                UPGRADE_POLICY_KEY,
                TIME_SYNC_KEY,
            ]
        );
        assert_eq!(plan.get(HW_VERSION_KEY).unwrap().new_value, "10");
    }

    #[test]
    fn test_pin_pair_emitted_when_only_policy_deviates() {
        let plan = plan_for(
            "guestOS = \"win98\"\n\
             ethernet0.virtualDev = \"vlance\"\n\
             virtualHW.version = \"8\"\n\
             tools.upgrade.policy = \"upgradeAtPowerCycle\"\n\
             tools.syncTime = \"TRUE\"\n",
        );
        assert!(plan.contains_key(HW_VERSION_KEY));
        assert!(plan.contains_key(UPGRADE_POLICY_KEY));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_time_sync_enforced_for_unknown_guest() {
        let plan = plan_for("ethernet0.virtualDev = \"e1000\"\ntools.syncTime = \"FALSE\"\n");
        let keys: Vec<&str> = plan.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec![TIME_SYNC_KEY]);
    }

    #[test]
    fn test_planning_is_idempotent_after_apply() {
        let content = "guestOS = \"winnt\"\nethernet0.virtualDev = \"e1000\"\nethernet3.present = \"TRUE\"\n";
        let first = plan_for(content);
        assert!(!first.is_empty());

        let updated = apply(content, &first);
        assert!(plan_for(&updated).is_empty());
    }

    fn guest_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("win95".to_string()),
            Just("win98".to_string()),
            Just("winnt".to_string()),
            Just("winxppro".to_string()),
            Just("windows7-64".to_string()),
            Just("windows9-64".to_string()),
            Just("ubuntu-64".to_string()),
            Just("darwin21-64".to_string()),
            "[a-z0-9-]{1,12}",
        ]
    }

    fn file_strategy() -> impl Strategy<Value = String> {
        (
            proptest::option::of(guest_strategy()),
            proptest::collection::vec(
                (0u32..4, proptest::option::of("vlance|e1000|e1000e|vmxnet3")),
                0..4,
            ),
            proptest::option::of("[0-9]{1,2}"),
            proptest::option::of("manual|upgradeAtPowerCycle"),
            proptest::option::of("TRUE|FALSE"),
        )
            .prop_map(|(guest, adapters, hw, policy, sync)| {
                let mut content = String::from(".encoding = \"UTF-8\"\n");
                if let Some(guest) = guest {
                    content.push_str(&format!("guestOS = \"{}\"\n", guest));
                }
                for (index, dev) in adapters {
                    content.push_str(&format!("ethernet{}.present = \"TRUE\"\n", index));
                    if let Some(dev) = dev {
                        content.push_str(&format!("ethernet{}.virtualDev = \"{}\"\n", index, dev));
                    }
                }
                if let Some(hw) = hw {
                    content.push_str(&format!("virtualHW.version = \"{}\"\n", hw));
                }
                if let Some(policy) = policy {
                    content.push_str(&format!("tools.upgrade.policy = \"{}\"\n", policy));
                }
                if let Some(sync) = sync {
                    content.push_str(&format!("tools.syncTime = \"{}\"\n", sync));
                }
                content
            })
    }

    proptest! {
        #[test]
        fn prop_plan_then_apply_is_idempotent(content in file_strategy()) {
            let first = plan_for(&content);
            let updated = apply(&content, &first);
            prop_assert!(plan_for(&updated).is_empty());
        }

        #[test]
        fn prop_pin_keys_always_paired(content in file_strategy()) {
            let plan = plan_for(&content);
            prop_assert_eq!(plan.contains_key(HW_VERSION_KEY), plan.contains_key(UPGRADE_POLICY_KEY));
        }
    }
}
