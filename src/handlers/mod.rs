// Request handlers, one per route
pub mod device_data;
pub mod status;

pub use device_data::device_data;
pub use status::status;
