//! Well-known sensor channels and their event bodies.
//!
//! Field names match what hpfeeds consumers of honeypot channels parse, so
//! these structs can be handed straight to
//! [`Publisher::publish`](crate::Publisher::publish).

use serde::Serialize;

/// Connection lifecycle events.
pub const CONNECTION_CHANNEL: &str = "dionaea.connections";

/// Completed downloads.
pub const CAPTURE_CHANNEL: &str = "dionaea.capture";

/// DCE/RPC requests seen by the SMB emulation.
pub const DCERPC_CHANNEL: &str = "dionaea.dcerpcrequests";

/// Shellcode emulation profiles.
pub const SHELLCODE_PROFILE_CHANNEL: &str = "dionaea.shellcodeprofiles";

/// Raw binaries of unique captures (file streaming target).
pub const UNIQUE_CHANNEL: &str = "mwbinary.dionaea.sensorunique";

/// Kind of connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Socket started listening.
    Listen,
    /// Outbound connection established.
    Connect,
    /// Inbound connection accepted.
    Accept,
    /// Inbound connection rejected.
    Reject,
    /// Connection still pending.
    Pending,
}

/// Body published on [`CONNECTION_CHANNEL`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEvent {
    /// How the connection came about.
    pub connection_type: ConnectionKind,
    /// Transport, e.g. `tcp` or `udp`.
    pub connection_transport: String,
    /// Emulated service that handled it, e.g. `smbd`.
    pub connection_protocol: String,
    /// Attacker address.
    pub remote_host: String,
    /// Attacker port.
    pub remote_port: u16,
    /// Reverse lookup of the attacker, empty when unknown.
    pub remote_hostname: String,
    /// Sensor address.
    pub local_host: String,
    /// Sensor port.
    pub local_port: u16,
}

/// Body published on [`CAPTURE_CHANNEL`].
///
/// Ports travel as strings on this channel.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEvent {
    /// Capture time, see [`timestamp`].
    pub time: String,
    /// Attacker address.
    pub saddr: String,
    /// Attacker port.
    pub sport: String,
    /// Sensor address.
    pub daddr: String,
    /// Sensor port.
    pub dport: String,
    /// Hex MD5 of the captured file.
    pub md5: String,
    /// Hex SHA-512 of the captured file.
    pub sha512: String,
    /// Where the sample was downloaded from.
    pub url: String,
}

/// Body published on [`DCERPC_CHANNEL`].
#[derive(Debug, Clone, Serialize)]
pub struct DceRpcRequest {
    /// Interface UUID of the bound service.
    pub uuid: String,
    /// Operation number called on it.
    pub opnum: u32,
    /// Attacker address.
    pub saddr: String,
    /// Attacker port.
    pub sport: String,
    /// Sensor address.
    pub daddr: String,
    /// Sensor port.
    pub dport: String,
}

/// Body published on [`SHELLCODE_PROFILE_CHANNEL`].
#[derive(Debug, Clone, Serialize)]
pub struct ShellcodeProfile {
    /// Shellcode emulation profile.
    pub profile: String,
}

/// Local wall-clock time in the format capture events carry,
/// e.g. `2024-05-01 13:37:00.123456 +02:00 +0200`.
pub fn timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f %:z %z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_event_fields() {
        let event = ConnectionEvent {
            connection_type: ConnectionKind::Accept,
            connection_transport: "tcp".into(),
            connection_protocol: "smbd".into(),
            remote_host: "198.51.100.7".into(),
            remote_port: 49152,
            remote_hostname: String::new(),
            local_host: "192.0.2.10".into(),
            local_port: 445,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["connection_type"], json!("accept"));
        assert_eq!(value["remote_port"], json!(49152));
        assert_eq!(value["local_port"], json!(445));
    }

    #[test]
    fn test_capture_ports_are_strings() {
        let event = CaptureEvent {
            time: timestamp(),
            saddr: "198.51.100.7".into(),
            sport: "1234".into(),
            daddr: "192.0.2.10".into(),
            dport: "445".into(),
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            sha512: String::new(),
            url: "http://198.51.100.7/x.exe".into(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["dport"], json!("445"));
    }

    #[test]
    fn test_timestamp_shape() {
        let stamp = timestamp();
        // date, time with microseconds, two offset renderings
        let parts: Vec<&str> = stamp.split(' ').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].split('.').nth(1).map(str::len), Some(6));
    }
}
