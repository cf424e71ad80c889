//! Static per-measurement classification data
//!
//! Keys are stored in sanitised form. Within one measurement kind a key
//! listed more than once resolves by precedence: ignore, then string, then
//! numeric.
use std::collections::{HashMap, HashSet};

/// Numeric representation of a forced-numeric field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Integer,
    Float,
}

/// How a sanitised field key is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Never written
    Ignore,
    /// Always written as a string
    ForceString,
    /// Always written as a number of the given kind, or dropped
    ForceNumeric(NumericKind),
    /// Type decided from the value's lexical shape
    Infer,
}

struct TableDef {
    kind: &'static str,
    ignore: &'static [&'static str],
    strings: &'static [&'static str],
    integers: &'static [&'static str],
    floats: &'static [&'static str],
    paired: &'static [&'static str],
}

const EMPTY: &[&str] = &[];

static BUILTIN: &[TableDef] = &[
    TableDef {
        kind: "hotspot_active",
        ignore: &["id"],
        strings: &[
            "server", "user", "address", "mac_address", "comment", "login_by", "domain", "radius",
        ],
        integers: &["bytes_in", "bytes_out", "packets_in", "packets_out"],
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "system_resource",
        ignore: &[
            "cpu_count",
            "total_memory",
            "total_hdd_space",
            "bad_blocks",
            "write_sect_since_reboot",
            "write_sect_total",
            "architecture_name",
            "board_name",
            "platform",
            "build_time",
            "factory_software",
        ],
        strings: &[
            "architecture_name",
            "board_name",
            "build_time",
            "factory_software",
            "platform",
            "version",
            "cpu",
        ],
        integers: &[
            "cpu_load",
            "free_memory",
            "total_memory",
            "free_hdd_space",
            "total_hdd_space",
            "cpu_count",
            "cpu_frequency",
            "bad_blocks",
            "write_sect_since_reboot",
            "write_sect_total",
            "uptime_seconds",
        ],
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "system_clock",
        ignore: &["gmt_offset", "dst_active", "time_zone_name", "time_zone_autodetect"],
        strings: &[
            "date",
            "time",
            "dst_active",
            "gmt_offset",
            "time_zone_autodetect",
            "time_zone_name",
        ],
        integers: EMPTY,
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "ip_address",
        ignore: EMPTY,
        strings: &[
            "actual_interface",
            "address",
            "disabled",
            "dynamic",
            "id",
            "interface",
            "invalid",
            "network",
            "comment",
            "slave",
        ],
        integers: EMPTY,
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "ip_arp",
        ignore: &["id", "dynamic", "complete", "published"],
        strings: &[
            "address", "dhcp", "disabled", "interface", "invalid", "mac_address", "status", "comment",
        ],
        integers: EMPTY,
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "ip_dhcp_server_lease",
        ignore: &["id", "radius", "dynamic", "blocked", "disabled", "dhcp_option"],
        strings: &[
            "active_address",
            "active_client_id",
            "active_mac_address",
            "active_server",
            "address",
            "address_lists",
            "client_id",
            "host_name",
            "server",
            "status",
            "mac_address",
            "comment",
            "class_id",
        ],
        integers: &["age_seconds", "expires_after_seconds", "last_seen_seconds"],
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "interface_stats",
        ignore: &[
            "mtu",
            "actual_mtu",
            "l2mtu",
            "max_l2mtu",
            "fp_rx_byte",
            "fp_tx_byte",
            "fp_rx_packet",
            "fp_tx_packet",
            "fp_rx_packets_per_second",
            "fp_tx_packets_per_second",
            "fp_rx_bits_per_second",
            "fp_tx_bits_per_second",
        ],
        strings: &[
            "comment",
            "default_name",
            "disabled",
            "id",
            "mac_address",
            "running",
            "slave",
            "type",
            "last_link_up_time",
            "last_link_down_time",
        ],
        integers: &[
            "link_downs",
            "rx_byte",
            "tx_byte",
            "rx_packet",
            "tx_packet",
            "rx_drop",
            "tx_drop",
            "tx_queue_drop",
            "rx_error",
            "tx_error",
            "rx_packets_per_second",
            "tx_packets_per_second",
            "rx_bits_per_second",
            "tx_bits_per_second",
            "rx_drops_per_second",
            "tx_drops_per_second",
            "rx_errors_per_second",
            "tx_errors_per_second",
            "tx_queue_drops_per_second",
        ],
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "interface_wireless_registration_table",
        ignore: &["id"],
        strings: &[
            "interface",
            "mac_address",
            "ssid",
            "band",
            "channel",
            "radio_name",
            "tx_rate",
            "rx_rate",
            "authorized",
            "auth_type",
            "last_ip",
            "comment",
        ],
        integers: &["tx_ccq", "rx_ccq", "signal_to_noise", "uptime_seconds"],
        floats: EMPTY,
        paired: &[
            "bytes",
            "packets",
            "frames",
            "frame_bytes",
            "hw_frames",
            "hw_frame_bytes",
        ],
    },
    TableDef {
        kind: "system_health",
        ignore: EMPTY,
        strings: &["id", "name", "type"],
        integers: &["fan1_speed", "fan2_speed"],
        floats: &["value", "voltage", "temperature", "cpu_temperature", "board_temperature1"],
        paired: EMPTY,
    },
    TableDef {
        kind: "system_routerboard",
        ignore: EMPTY,
        strings: &[
            "board_name",
            "current_firmware",
            "factory_firmware",
            "firmware_type",
            "model",
            "routerboard",
            "serial_number",
            "upgrade_firmware",
            "revision",
        ],
        integers: EMPTY,
        floats: EMPTY,
        paired: EMPTY,
    },
    TableDef {
        kind: "user",
        ignore: EMPTY,
        strings: &[
            "address",
            "disabled",
            "expired",
            "group",
            "id",
            "last_logged_in",
            "name",
            "comment",
        ],
        integers: EMPTY,
        floats: EMPTY,
        paired: EMPTY,
    },
];

/// Classification data for one measurement kind
#[derive(Debug, Default)]
pub struct MeasurementTable {
    fields: HashMap<&'static str, Disposition>,
    paired: HashSet<&'static str>,
}

impl MeasurementTable {
    fn from_def(def: &TableDef) -> Self {
        let mut fields = HashMap::new();

        // Lowest precedence first so later inserts override.
        for key in def.floats {
            fields.insert(*key, Disposition::ForceNumeric(NumericKind::Float));
        }
        for key in def.integers {
            fields.insert(*key, Disposition::ForceNumeric(NumericKind::Integer));
        }
        for key in def.strings {
            fields.insert(*key, Disposition::ForceString);
        }
        for key in def.ignore {
            fields.insert(*key, Disposition::Ignore);
        }

        Self {
            fields,
            paired: def.paired.iter().copied().collect(),
        }
    }

    /// Disposition of a sanitised key, `Infer` when unregistered
    pub fn disposition(&self, key: &str) -> Disposition {
        self.fields.get(key).copied().unwrap_or(Disposition::Infer)
    }

    /// Whether the key holds a `<tx>/<rx>` pair
    pub fn is_paired(&self, key: &str) -> bool {
        self.paired.contains(key)
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.fields.contains_key(key) || self.paired.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().chain(self.paired.iter()).copied()
    }
}

/// All classification tables, built once at startup and never mutated
#[derive(Debug)]
pub struct ClassificationTables {
    tables: HashMap<&'static str, MeasurementTable>,
    empty: MeasurementTable,
}

impl ClassificationTables {
    /// The built-in RouterOS tables
    pub fn builtin() -> Self {
        let tables = BUILTIN
            .iter()
            .map(|def| (def.kind, MeasurementTable::from_def(def)))
            .collect();

        Self {
            tables,
            empty: MeasurementTable::default(),
        }
    }

    /// Table for a measurement kind; unknown kinds get an empty table
    pub fn table(&self, kind: &str) -> &MeasurementTable {
        self.tables.get(kind).unwrap_or(&self.empty)
    }

    pub fn disposition(&self, kind: &str, key: &str) -> Disposition {
        self.table(kind).disposition(key)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.keys().copied()
    }
}

impl Default for ClassificationTables {
    fn default() -> Self {
        Self::builtin()
    }
}
