//! External collaborator interfaces: reading sensor values and applying
//! actuator commands. The node depends only on these traits, not on any
//! concrete device driver — tests supply fakes, a real deployment wires up
//! hardware-backed implementations.

/// Produces a value for a sensor this node advertises in its local prefixes.
pub trait SensorReader: Send + Sync {
    /// Read the current value of `sensor_type` (the last name segment,
    /// e.g. `"temperature"`), formatted as it will be published on the wire.
    fn read(&self, sensor_type: &str) -> Option<String>;
}

/// Applies an actuator command decoded from an incoming `data` payload.
pub trait ActuationSink: Send + Sync {
    fn actuate(&self, actuator: &str, command: &str);
}

/// A `SensorReader`/`ActuationSink` pair over fixed in-memory values, useful
/// for tests and for nodes with no real hardware attached.
#[derive(Default)]
pub struct StaticSensors {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl StaticSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sensor_type: &str, value: impl Into<String>) {
        self.values.lock().unwrap().insert(sensor_type.to_string(), value.into());
    }
}

impl SensorReader for StaticSensors {
    fn read(&self, sensor_type: &str) -> Option<String> {
        self.values.lock().unwrap().get(sensor_type).cloned()
    }
}

impl ActuationSink for StaticSensors {
    fn actuate(&self, actuator: &str, command: &str) {
        self.set(actuator, command.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_sensors_round_trip_reads_and_actuations() {
        let sensors = StaticSensors::new();
        sensors.set("temperature", "21.5");
        assert_eq!(sensors.read("temperature").as_deref(), Some("21.5"));

        sensors.actuate("light_switch", "on");
        assert_eq!(sensors.read("light_switch").as_deref(), Some("on"));
    }

    #[test]
    fn unset_sensor_reads_as_none() {
        let sensors = StaticSensors::new();
        assert_eq!(sensors.read("humidity"), None);
    }
}
