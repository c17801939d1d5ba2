use std::time::{Duration, Instant};

use tracing::debug;

use setpoint_common::{
    config::ServerConfig,
    device::{self, DeviceState},
    ServerError, SetTempStore,
};

const USER_AGENT: &str = "setpoint-controller";

/// Blocking client for the home-automation control server. Each call
/// opens a fresh connection and, connect and body read included, gives up
/// once the comms timeout has elapsed.
#[derive(Clone)]
pub struct ControlServerClient {
    agent: ureq::Agent,
    base_url: String,
    timeout: Duration,
}

impl ControlServerClient {
    pub fn new(config: &ServerConfig) -> Self {
        let timeout = Duration::from_millis(config.comms_timeout_ms);
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .max_idle_connections(0)
            .user_agent(USER_AGENT)
            .build();

        Self {
            agent,
            base_url: format!("http://{}:{}", config.host, config.port),
            timeout,
        }
    }

    pub fn device_state(&self, dev_id: &str) -> Result<DeviceState, ServerError> {
        let body = self.get(&device::device_url(dev_id))?;
        DeviceState::from_json(&body)
    }

    pub fn relay_state(&self, dev_id: &str, subdev: &str) -> Result<bool, ServerError> {
        self.device_state(dev_id)?.relay_state(subdev)
    }

    pub fn set_relay_state(&self, dev_id: &str, subdev: &str, on: bool) -> Result<(), ServerError> {
        self.get(&device::relay_url(dev_id, subdev, on))?;
        Ok(())
    }

    fn get(&self, path: &str) -> Result<String, ServerError> {
        let url = format!("{}{path}", self.base_url);
        debug!("control server request: GET {url}");

        let started = Instant::now();
        let response = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| self.request_error(err, started))?;

        response.into_string().map_err(|err| {
            if started.elapsed() >= self.timeout {
                self.timeout_error()
            } else {
                ServerError::Io(err)
            }
        })
    }

    fn request_error(&self, err: ureq::Error, started: Instant) -> ServerError {
        match err {
            ureq::Error::Status(code, _) => ServerError::Status(code),
            ureq::Error::Transport(_) if started.elapsed() >= self.timeout => self.timeout_error(),
            ureq::Error::Transport(transport) => match transport.kind() {
                ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                    ServerError::Connect(transport.to_string())
                }
                _ => ServerError::Transport(transport.to_string()),
            },
        }
    }

    fn timeout_error(&self) -> ServerError {
        ServerError::Timeout(self.timeout.as_millis().try_into().unwrap_or(u64::MAX))
    }
}

impl SetTempStore for ControlServerClient {
    fn push_set_temperature(
        &mut self,
        controller_id: &str,
        set_temp: f32,
    ) -> Result<Option<f32>, ServerError> {
        let body = self.get(&device::set_temp_url(controller_id, set_temp))?;

        // The echo is advisory; the controller reads the value back anyway.
        match DeviceState::from_json(&body).and_then(|state| state.controller_set_temp()) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                debug!("no usable set temp echo for {controller_id}: {err}");
                Ok(None)
            }
        }
    }

    fn pull_set_temperature(&mut self, controller_id: &str) -> Result<f32, ServerError> {
        self.device_state(controller_id)?.controller_set_temp()
    }
}
