pub mod config;
pub mod device;
pub mod display;
pub mod encoder;
pub mod error;
pub mod field;
pub mod store;
pub mod temp_controller;
pub mod timer;

pub use config::{LampConfig, RuntimeConfig, ServerConfig, TempControllerConfig};
pub use device::DeviceState;
pub use display::{DisplaySink, SetTempDisplay};
pub use encoder::{Encoder, SharedEncoder};
pub use error::ServerError;
pub use field::Field;
pub use store::SetTempStore;
pub use temp_controller::{Controller, TempController};
pub use timer::{Action, Clock, ManualClock, MonotonicClock, Timer};
