/// The four channels the device talks on, all below one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Unretained periodic sensor samples
    pub sensor_data: String,
    /// Retained actuator state and link quality
    pub device_state: String,
    /// Inbound remote commands
    pub device_command: String,
    /// Retained presence record and last will
    pub system_online: String,
}

impl TopicSet {
    pub fn for_namespace(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches('/');
        Self {
            sensor_data: format!("{}/sensor/data", ns),
            device_state: format!("{}/device/state", ns),
            device_command: format!("{}/device/cmd", ns),
            system_online: format!("{}/sys/online", ns),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [
            &self.sensor_data,
            &self.device_state,
            &self.device_command,
            &self.system_online,
        ]
    }
}
