#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Device {
    pub device_id: String,

    pub name: String,

    /// Host name or IP address the device agent listens on.
    pub address: String,
}
