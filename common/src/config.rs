use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TempControllerConfig {
    pub name: String,
    pub update_period_ms: u64,
    pub server_request_period_ms: u64,
    pub position_changing_timeout_ms: u64,
    pub min_safe_temp: f32,
    pub max_safe_temp: f32,
    /// Encoder counts per degree.
    pub multiplier: f32,
    pub initial_set_temp: f32,
}

impl Default for TempControllerConfig {
    fn default() -> Self {
        Self {
            name: "lr_temp".to_string(),
            update_period_ms: 100,
            server_request_period_ms: 5_000,
            position_changing_timeout_ms: 2_000,
            min_safe_temp: 50.0,
            max_safe_temp: 75.0,
            multiplier: 10.0,
            initial_set_temp: 68.0,
        }
    }
}

impl TempControllerConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !self.min_safe_temp.is_finite() || !self.max_safe_temp.is_finite() {
            self.min_safe_temp = defaults.min_safe_temp;
            self.max_safe_temp = defaults.max_safe_temp;
        }
        if self.min_safe_temp > self.max_safe_temp {
            std::mem::swap(&mut self.min_safe_temp, &mut self.max_safe_temp);
        }

        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            self.multiplier = defaults.multiplier;
        }

        if !self.initial_set_temp.is_finite() {
            self.initial_set_temp = defaults.initial_set_temp;
        }
        self.initial_set_temp = self
            .initial_set_temp
            .clamp(self.min_safe_temp, self.max_safe_temp);

        if self.name.trim().is_empty() {
            self.name = defaults.name;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub comms_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.10".to_string(),
            port: 8000,
            comms_timeout_ms: 3_000,
        }
    }
}

impl ServerConfig {
    pub fn sanitize(&mut self) {
        if self.host.trim().is_empty() {
            self.host = Self::default().host;
        }
        if self.port == 0 {
            self.port = Self::default().port;
        }
        self.comms_timeout_ms = self.comms_timeout_ms.clamp(100, 30_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LampConfig {
    pub dev_id: String,
    pub relay: String,
}

impl Default for LampConfig {
    fn default() -> Self {
        Self {
            dev_id: "ESP_2255".to_string(),
            relay: "relay_1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: TempControllerConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub lamp: LampConfig,
    pub watchdog_timeout_ms: u64,
    pub loop_delay_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: TempControllerConfig::default(),
            server: ServerConfig::default(),
            lamp: LampConfig::default(),
            watchdog_timeout_ms: 5_000,
            loop_delay_ms: 5,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.controller.sanitize();
        self.server.sanitize();

        // A settle cycle makes two requests back to back, and the request
        // deadline cannot interrupt a slow DNS lookup.
        let floor = self.server.comms_timeout_ms.saturating_mul(4);
        if self.watchdog_timeout_ms < floor {
            self.watchdog_timeout_ms = floor;
        }
        self.loop_delay_ms = self.loop_delay_ms.clamp(1, 1_000);
    }
}
