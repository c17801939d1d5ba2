//! Wire model of the home-automation control server.
//!
//! Every query is a plain HTTP `GET` on one of the paths built here, and
//! every answer is the full device document:
//!
//! ```json
//! {"subdevs": {"controller": {"state": {"set_temp": 70.0}},
//!              "relay_1":    {"state": {"state": 1}}}}
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ServerError;

pub const CONTROLLER_SUBDEV: &str = "controller";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DeviceState {
    #[serde(default)]
    pub subdevs: HashMap<String, SubDevice>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SubDevice {
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl DeviceState {
    pub fn from_json(body: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn controller_set_temp(&self) -> Result<f32, ServerError> {
        let value = self
            .state_value(CONTROLLER_SUBDEV, "set_temp")?
            .as_f64()
            .ok_or_else(|| missing(CONTROLLER_SUBDEV, "set_temp"))? as f32;
        if !value.is_finite() {
            return Err(ServerError::InvalidValue(value));
        }
        Ok(value)
    }

    pub fn relay_state(&self, subdev: &str) -> Result<bool, ServerError> {
        match self.state_value(subdev, "state")? {
            Value::Bool(on) => Ok(*on),
            value => value
                .as_i64()
                .map(|state| state == 1)
                .ok_or_else(|| missing(subdev, "state")),
        }
    }

    fn state_value(&self, subdev: &str, key: &str) -> Result<&Value, ServerError> {
        self.subdevs
            .get(subdev)
            .and_then(|sub| sub.state.get(key))
            .ok_or_else(|| missing(subdev, key))
    }
}

fn missing(subdev: &str, key: &str) -> ServerError {
    ServerError::MissingField(format!("subdevs.{subdev}.state.{key}"))
}

pub fn device_url(dev_id: &str) -> String {
    format!("/device?dev_id={dev_id}")
}

pub fn set_temp_url(dev_id: &str, set_temp: f32) -> String {
    format!("/controller/set_temp?dev_id={dev_id}&set_temp={set_temp:.1}")
}

pub fn relay_url(dev_id: &str, subdev: &str, on: bool) -> String {
    format!(
        "/relay/set_state?dev_id={dev_id}&subdev={subdev}&state={}",
        u8::from(on)
    )
}
