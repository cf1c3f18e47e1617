use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Virtual network adapter driver family (`ethernetN.virtualDev`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Vlance,
    E1000,
    E1000e,
    Vmxnet,
    Vmxnet2,
    Vmxnet3,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Vlance => "vlance",
            AdapterType::E1000 => "e1000",
            AdapterType::E1000e => "e1000e",
            AdapterType::Vmxnet => "vmxnet",
            AdapterType::Vmxnet2 => "vmxnet2",
            AdapterType::Vmxnet3 => "vmxnet3",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vlance" => Ok(AdapterType::Vlance),
            "e1000" => Ok(AdapterType::E1000),
            "e1000e" => Ok(AdapterType::E1000e),
            "vmxnet" => Ok(AdapterType::Vmxnet),
            "vmxnet2" => Ok(AdapterType::Vmxnet2),
            "vmxnet3" => Ok(AdapterType::Vmxnet3),
            other => Err(format!("Unknown adapter type: {}", other)),
        }
    }
}

/// User settings from `vmxtune.yaml`
///
/// Every field has a default so a partial (or missing) file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Copy each file to `<file>.bak` before writing it
    pub backup: bool,

    /// Descend into subdirectories of the root
    pub recursive: bool,

    /// Configuration file extension, without the dot
    pub extension: String,

    /// Offer to terminate running engine processes before scanning
    pub guard_running_instances: bool,

    /// Process names of the virtualization engine (headless and full application)
    pub engine_processes: Vec<String>,

    /// Upper bound for a single process-table query
    pub process_query_timeout_secs: u64,

    /// Adapter recommended when no rule matches the guest OS
    pub baseline_adapter: AdapterType,

    /// Adapter the engine uses when `ethernetN.virtualDev` is absent, by guest OS
    pub implicit_adapter_defaults: IndexMap<String, AdapterType>,

    pub debug_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup: true,
            recursive: true,
            extension: "vmx".to_string(),
            guard_running_instances: true,
            engine_processes: vec!["vmware-vmx".to_string(), "vmware".to_string()],
            process_query_timeout_secs: 10,
            baseline_adapter: AdapterType::E1000,
            implicit_adapter_defaults: default_implicit_adapters(),
            debug_mode: false,
        }
    }
}

fn default_implicit_adapters() -> IndexMap<String, AdapterType> {
    let mut defaults = IndexMap::new();
    for guest in [
        "win31",
        "win95",
        "win98",
        "winme",
        "winnt",
        "win2000pro",
        "win2000serv",
        "winxppro",
        "winxphome",
    ] {
        defaults.insert(guest.to_string(), AdapterType::Vlance);
    }
    defaults.insert("winnetstandard".to_string(), AdapterType::E1000);
    defaults.insert("winnetenterprise".to_string(), AdapterType::E1000);
    defaults
}
