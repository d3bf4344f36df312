//! Application-layer payload classification hook.
//!
//! The wire protocol carries opaque string payloads; what a `data` packet
//! *means* — a sensor reading, an actuator command, an alert — is decided by
//! matching on its content rather than by a typed field. This module
//! formalises that discrimination behind a trait so the matching rules can
//! be swapped without touching the forwarder, while the default
//! implementation reproduces the original node's regex-based rules exactly.

use regex::Regex;

/// What a decoded `data` packet's payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    /// An actuator command: `name` ends in the target actuator, `data` ends
    /// in the command to apply.
    Command { actuator: String, command: String },
    /// A condition worth surfacing to a human, destined for phone-prefixed
    /// peers unless this node itself is one.
    Alert,
    /// Ordinary sensor data with no special handling.
    Plain,
}

pub trait PayloadInterpreter: Send + Sync {
    fn classify(&self, name: &str, data: &str) -> PayloadKind;

    /// Whether `data` for sensor `name` crosses the threshold worth an
    /// alert, used when *producing* a payload (as opposed to classifying an
    /// already-labelled one).
    fn is_alertable(&self, name: &str, data: &str) -> bool;
}

/// Reproduces the original node's `decode_command` / alert-keyword / phone
/// forwarding rules.
pub struct RegexPayloadInterpreter {
    command_re: Regex,
    alert_re: Regex,
}

impl Default for RegexPayloadInterpreter {
    fn default() -> Self {
        Self {
            command_re: Regex::new("command").expect("static pattern"),
            alert_re: Regex::new("alert").expect("static pattern"),
        }
    }
}

impl RegexPayloadInterpreter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadInterpreter for RegexPayloadInterpreter {
    fn classify(&self, name: &str, data: &str) -> PayloadKind {
        if self.command_re.is_match(data) {
            let actuator = name.rsplit('/').next().unwrap_or(name).to_string();
            let command = data.rsplit('/').next().unwrap_or(data).to_string();
            return PayloadKind::Command { actuator, command };
        }
        if self.alert_re.is_match(data) {
            return PayloadKind::Alert;
        }
        PayloadKind::Plain
    }

    fn is_alertable(&self, name: &str, data: &str) -> bool {
        let sensor_type = name.rsplit('/').next().unwrap_or("");
        match sensor_type {
            "smoke" | "co2" | "radiation" => data.parse::<f64>().map(|v| v > 0.0).unwrap_or(false),
            "temperature" => data.parse::<f64>().map(|v| v > 40.0).unwrap_or(false),
            "motion" => data == "1" || data.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

/// Whether `node_name` is a node that should be treated as a phone for
/// alert routing purposes (§4.6).
pub fn is_phone(node_name: &str) -> bool {
    node_name.contains("phone")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_command_payload() {
        let interp = RegexPayloadInterpreter::new();
        let kind = interp.classify("/house1/room1/light_switch", "command/on");
        assert_eq!(
            kind,
            PayloadKind::Command { actuator: "light_switch".into(), command: "on".into() }
        );
    }

    #[test]
    fn classifies_alert_payload() {
        let interp = RegexPayloadInterpreter::new();
        assert_eq!(interp.classify("/house1/room1/smoke", "alert/smoke detected"), PayloadKind::Alert);
    }

    #[test]
    fn classifies_plain_payload() {
        let interp = RegexPayloadInterpreter::new();
        assert_eq!(interp.classify("/house1/room1/temp", "21.5"), PayloadKind::Plain);
    }

    #[test]
    fn smoke_reading_above_zero_is_alertable() {
        let interp = RegexPayloadInterpreter::new();
        assert!(interp.is_alertable("/house1/room1/smoke", "1"));
        assert!(!interp.is_alertable("/house1/room1/smoke", "0"));
    }

    #[test]
    fn temperature_above_threshold_is_alertable() {
        let interp = RegexPayloadInterpreter::new();
        assert!(interp.is_alertable("/house1/room1/temperature", "55.0"));
        assert!(!interp.is_alertable("/house1/room1/temperature", "21.0"));
    }

    #[test]
    fn phone_name_detection() {
        assert!(is_phone("/group21/phone1"));
        assert!(!is_phone("/group21/house1/room1"));
    }
}
