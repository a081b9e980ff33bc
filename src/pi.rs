mod device;
mod reading;
mod sensor;

pub use device::*;
pub use reading::*;
pub use sensor::*;
