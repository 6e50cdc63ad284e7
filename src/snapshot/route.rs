//! Route records as listed by the audio server.

use std::collections::BTreeMap;
use std::fmt;

/// Header that starts a record in the audio server's listing.
pub(crate) const ROUTE_HEADER: &str = "Sink Input #";

/// Full-scale raw volume used when rendering percentages back into listing text.
const VOLUME_NORM: f64 = 65536.0;

macro_rules! known_properties {
    ($($field:ident => $key:literal,)*) => {
        /// Properties block of a route.
        ///
        /// Well-known keys get a dedicated field; every other key lands in
        /// [`Properties::unknown`] with key and value exactly as listed.
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct Properties {
            $(
                #[doc = concat!("`", $key, "`")]
                pub $field: String,
            )*
            /// Properties outside the well-known set.
            pub unknown: BTreeMap<String, String>,
        }

        impl Properties {
            /// Listing keys of the well-known properties.
            pub const KNOWN_KEYS: &'static [&'static str] = &[$($key),*];

            /// Stores a property, routing keys outside the known set into
            /// [`Properties::unknown`].
            pub fn set(&mut self, key: &str, value: impl Into<String>) {
                let value = value.into();
                match key {
                    $($key => self.$field = value,)*
                    _ => {
                        self.unknown.insert(key.to_string(), value);
                    }
                }
            }

            /// Looks up a property by its listing key.
            pub fn get(&self, key: &str) -> Option<&str> {
                match key {
                    $($key => Some(self.$field.as_str()),)*
                    _ => self.unknown.get(key).map(String::as_str),
                }
            }

            /// Well-known properties as `(key, value)` pairs, in table order.
            pub fn known(&self) -> Vec<(&'static str, &str)> {
                vec![$(($key, self.$field.as_str()),)*]
            }
        }
    };
}

known_properties! {
    client_api => "client.api",
    pulse_server_type => "pulse.server.type",
    application_name => "application.name",
    application_process_id => "application.process.id",
    application_process_user => "application.process.user",
    application_process_host => "application.process.host",
    application_process_binary => "application.process.binary",
    application_language => "application.language",
    window_x11_display => "window.x11.display",
    application_process_machine_id => "application.process.machine_id",
    media_name => "media.name",
    node_rate => "node.rate",
    node_latency => "node.latency",
    stream_is_live => "stream.is-live",
    node_name => "node.name",
    node_want_driver => "node.want-driver",
    node_autoconnect => "node.autoconnect",
    media_class => "media.class",
    port_group => "port.group",
    adapt_follower_spa_node => "adapt.follower.spa-node",
    object_register => "object.register",
    factory_id => "factory.id",
    clock_quantum_limit => "clock.quantum-limit",
    node_loop_name => "node.loop.name",
    library_name => "library.name",
    client_id => "client.id",
    object_id => "object.id",
    object_serial => "object.serial",
    pulse_attr_maxlength => "pulse.attr.maxlength",
    pulse_attr_tlength => "pulse.attr.tlength",
    pulse_attr_prebuf => "pulse.attr.prebuf",
    pulse_attr_minreq => "pulse.attr.minreq",
    node_driver_id => "node.driver-id",
    module_stream_restore_id => "module-stream-restore.id",
}

/// One playback stream of one application, as listed in a snapshot.
///
/// Records are produced fresh by every snapshot; nothing updates a record
/// after parsing. `Display` renders the record back into listing text that
/// [`parse_snapshot`](crate::parse_snapshot) reads into an equal record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    /// Route id, unique within one snapshot.
    pub id: u32,
    /// `Driver`
    pub driver: String,
    /// `Owner Module`
    pub owner_module: String,
    /// `Client` id owning the route.
    pub client: u32,
    /// `Sink` id the route plays into.
    pub sink: u32,
    /// `Sample Specification`, e.g. `float32le 2ch 48000Hz`.
    pub sample_spec: String,
    /// `Channel Map`, e.g. `front-left,front-right`.
    pub channel_map: String,
    /// `Format`
    pub format: String,
    /// `Corked`
    pub corked: bool,
    /// `Mute`
    pub muted: bool,
    /// Per-channel volume as a percentage (`100%` is `100.0`).
    pub volume: BTreeMap<String, f64>,
    /// Volume `balance`.
    pub balance: f64,
    /// `Buffer Latency` in microseconds.
    pub buffer_latency_usec: u64,
    /// `Sink Latency` in microseconds.
    pub sink_latency_usec: u64,
    /// `Resample method`
    pub resample_method: String,
    /// The `Properties` block.
    pub properties: Properties,
    /// Top-level `key: value` lines outside the known key table.
    pub unknown: BTreeMap<String, String>,
}

impl Route {
    /// Creates an empty record with the given id.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// The `application.name` property.
    pub fn application_name(&self) -> &str {
        &self.properties.application_name
    }

    /// Returns `true` if the route belongs to `app_name`, ignoring case.
    pub fn belongs_to(&self, app_name: &str) -> bool {
        self.application_name().to_lowercase() == app_name.to_lowercase()
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn raw_volume(percent: f64) -> u64 {
    (percent / 100.0 * VOLUME_NORM).round() as u64
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{ROUTE_HEADER}{}", self.id)?;
        writeln!(f, "\tDriver: {}", self.driver)?;
        writeln!(f, "\tOwner Module: {}", self.owner_module)?;
        writeln!(f, "\tClient: {}", self.client)?;
        writeln!(f, "\tSink: {}", self.sink)?;
        writeln!(f, "\tSample Specification: {}", self.sample_spec)?;
        writeln!(f, "\tChannel Map: {}", self.channel_map)?;
        writeln!(f, "\tFormat: {}", self.format)?;
        writeln!(f, "\tCorked: {}", yes_no(self.corked))?;
        writeln!(f, "\tMute: {}", yes_no(self.muted))?;

        write!(f, "\tVolume:")?;
        for (i, (channel, percent)) in self.volume.iter().enumerate() {
            let separator = if i == 0 { " " } else { ",   " };
            write!(
                f,
                "{separator}{channel}: {} / {percent}%",
                raw_volume(*percent)
            )?;
        }
        writeln!(f)?;
        writeln!(f, "\t        balance {}", self.balance)?;

        writeln!(f, "\tBuffer Latency: {} usec", self.buffer_latency_usec)?;
        writeln!(f, "\tSink Latency: {} usec", self.sink_latency_usec)?;
        writeln!(f, "\tResample method: {}", self.resample_method)?;
        for (key, value) in &self.unknown {
            writeln!(f, "\t{key}: {value}")?;
        }

        writeln!(f, "\tProperties:")?;
        for (key, value) in self.properties.known() {
            if !value.is_empty() {
                writeln!(f, "\t\t{key} = \"{value}\"")?;
            }
        }
        for (key, value) in &self.properties.unknown {
            writeln!(f, "\t\t{key} = \"{value}\"")?;
        }
        Ok(())
    }
}

/// Renders a whole listing, one record after another.
pub fn render_snapshot(routes: &[Route]) -> String {
    routes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
