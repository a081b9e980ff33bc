#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Sensor {
    pub sensor_id: i32,

    pub device_id: String,

    pub location: String,

    pub sensor_type: String,

    pub pin: Option<i32>,
}

/// One row of the (location, device name) -> sensor id mapping for a device.
///
/// Devices report readings by location and their own display name; this is
/// what the payload rows are joined against.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SensorKey {
    pub sensor_id: i32,

    pub location: String,

    pub device_name: String,
}
