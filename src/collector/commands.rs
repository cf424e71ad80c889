//! Command catalogue and capability gating
use serde_json::Value;

use crate::transform::RawRecord;
use crate::transform::sanitize_key;

/// Inventory of installed feature packages
pub const PACKAGE_COMMAND: &str = "/system/package/print";

/// Network interfaces with their static attributes
pub const INTERFACE_COMMAND: &str = "/interface/print";

/// One-shot traffic sample for a single interface
pub const MONITOR_TRAFFIC_COMMAND: &str = "/interface/monitor-traffic";

/// Active captive-portal clients
pub const SESSION_COMMAND: &str = "/ip/hotspot/active/print";

/// Measurement written for merged interface attributes and samples
pub const INTERFACE_MEASUREMENT: &str = "interface_stats";

/// Measurement written for captive-portal clients
pub const SESSION_MEASUREMENT: &str = "hotspot_active";

/// Commands issued to every device, in order
pub const BASE_COMMANDS: &[&str] = &[
    "/system/resource/print",
    "/system/clock/print",
    "/ip/address/print",
    "/ip/arp/print",
    "/ip/dhcp-server/lease/print",
    "/user/print",
];

const WIRELESS_MEASUREMENT: &str = "interface_wireless_registration_table";

/// Measurement kinds that denote the same dataset under another name
const ALIASES: &[(&str, &str)] = &[
    ("interface_wifi_registration_table", WIRELESS_MEASUREMENT),
    ("interface_wifiwave2_registration_table", WIRELESS_MEASUREMENT),
];

/// Derive the measurement kind for a command path
///
/// `/ip/dhcp-server/lease/print` becomes `ip_dhcp_server_lease`; the
/// wireless driver variants all collapse to
/// `interface_wireless_registration_table`.
pub fn measurement_kind(command: &str) -> String {
    let path = command.trim();
    let path = path.strip_suffix("/print").unwrap_or(path);
    let path = path.trim_start_matches('/');

    let kind = sanitize_key(&path.replace('/', "_"));
    if kind.is_empty() {
        return "unknown".to_string();
    }

    ALIASES
        .iter()
        .find(|(alias, _)| *alias == kind)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(kind)
}

/// Wireless driver packages, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessPackage {
    Wifi,
    WifiWave2,
    Wireless,
}

impl WirelessPackage {
    const PREFERENCE: [WirelessPackage; 3] = [
        WirelessPackage::Wifi,
        WirelessPackage::WifiWave2,
        WirelessPackage::Wireless,
    ];

    /// Package name as listed by the device
    pub fn package_name(&self) -> &'static str {
        match self {
            WirelessPackage::Wifi => "wifi",
            WirelessPackage::WifiWave2 => "wifiwave2",
            WirelessPackage::Wireless => "wireless",
        }
    }

    /// Registration table command for this driver
    pub fn registration_command(&self) -> &'static str {
        match self {
            WirelessPackage::Wifi => "/interface/wifi/registration-table/print",
            WirelessPackage::WifiWave2 => "/interface/wifiwave2/registration-table/print",
            WirelessPackage::Wireless => "/interface/wireless/registration-table/print",
        }
    }
}

/// Optional features found on a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub wireless: Option<WirelessPackage>,
}

impl Capabilities {
    /// Derive capabilities from the package inventory rows
    pub fn from_packages(packages: &[RawRecord]) -> Self {
        let enabled: Vec<&str> = packages
            .iter()
            .filter(|p| is_enabled(p))
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .map(str::trim)
            .collect();

        let wireless = WirelessPackage::PREFERENCE
            .into_iter()
            .find(|pkg| enabled.iter().any(|name| name.eq_ignore_ascii_case(pkg.package_name())));

        Self { wireless }
    }

    /// The command list for one device, base commands first
    pub fn command_plan(&self, extra_commands: &[String]) -> Vec<String> {
        let mut plan: Vec<String> = BASE_COMMANDS.iter().map(|c| c.to_string()).collect();
        if let Some(pkg) = self.wireless {
            plan.push(pkg.registration_command().to_string());
        }
        for command in extra_commands {
            let command = command.trim();
            if !command.is_empty() && !plan.iter().any(|c| c == command) {
                plan.push(command.to_string());
            }
        }
        plan
    }
}

/// A package is enabled unless it says otherwise
fn is_enabled(package: &RawRecord) -> bool {
    match package.get("disabled") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(disabled)) => !disabled,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("false"),
        Some(_) => false,
    }
}
