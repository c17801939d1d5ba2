use std::{
    collections::HashMap,
    future::IntoFuture,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use setpoint_common::{
    Controller, DisplaySink, Encoder, Field, LampConfig, MonotonicClock, RuntimeConfig,
    SetTempDisplay, SharedEncoder, TempController,
};

use crate::{client::ControlServerClient, watchdog::Watchdog};

type HostController = TempController<MonotonicClock, SharedEncoder, ControlServerClient>;

/// Largest knob movement accepted by one `/api/knob` request, in counts.
const MAX_KNOB_STEP: i32 = 100;

#[derive(Clone)]
struct AppState {
    status: Arc<Mutex<StatusView>>,
    knob: SharedEncoder,
    client: ControlServerClient,
    lamp: LampConfig,
}

#[derive(Debug, Clone, Serialize)]
struct StatusView {
    name: String,
    #[serde(rename = "setTemp")]
    set_temp: f32,
    #[serde(rename = "positionChanging")]
    position_changing: bool,
    #[serde(rename = "encoderCount")]
    encoder_count: i64,
}

#[derive(Debug, Serialize)]
struct LampStatus {
    #[serde(rename = "devId")]
    dev_id: String,
    on: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

/// Renders set-temperature changes to the log, standing in for the
/// touchscreen label.
struct LogRenderer {
    name: String,
}

impl DisplaySink for LogRenderer {
    fn update(&mut self, value: f32) {
        info!("{}: display set temp {value:.1}", self.name);
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });

    if let Ok(host) = std::env::var("CTRL_SERVER_HOST") {
        runtime.server.host = host;
    }
    if let Some(port) = std::env::var("CTRL_SERVER_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.server.port = port;
    }
    runtime.sanitize();

    info!(
        "controller `{}` syncing with {}:{}",
        runtime.controller.name, runtime.server.host, runtime.server.port
    );

    let clock = MonotonicClock::new();
    let knob = SharedEncoder::default();
    let client = ControlServerClient::new(&runtime.server);
    let display = SetTempDisplay::new(LogRenderer {
        name: runtime.controller.name.clone(),
    });
    let mut controller = TempController::new(
        runtime.controller.clone(),
        clock,
        knob.clone(),
        client.clone(),
        Some(Box::new(display)),
    );
    controller.init();

    let status = Arc::new(Mutex::new(status_of(&controller)));
    let watchdog = Watchdog::new(runtime.watchdog_timeout_ms, clock);

    spawn_control_loop(
        controller,
        watchdog.clone(),
        status.clone(),
        Duration::from_millis(runtime.loop_delay_ms),
    )?;
    let watchdog_monitor = spawn_watchdog_monitor(watchdog, runtime.watchdog_timeout_ms);

    let app_state = AppState {
        status,
        knob,
        client,
        lamp: runtime.lamp.clone(),
    };

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/knob", post(handle_turn_knob))
        .route("/api/lamp", get(handle_get_lamp).post(handle_set_lamp))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served.context("status server failed"),
        _ = watchdog_monitor => Err(anyhow!("watchdog tripped; restarting")),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

fn spawn_control_loop(
    mut controller: HostController,
    watchdog: Watchdog<MonotonicClock>,
    status: Arc<Mutex<StatusView>>,
    loop_delay: Duration,
) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("control-loop".into())
        .spawn(move || loop {
            watchdog.feed();

            if controller.update() {
                if let Ok(mut view) = status.lock() {
                    *view = status_of(&controller);
                }
            }

            thread::sleep(loop_delay);
        })
        .context("failed to spawn control loop thread")?;
    Ok(())
}

fn spawn_watchdog_monitor(
    watchdog: Watchdog<MonotonicClock>,
    timeout_ms: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis((timeout_ms / 4).max(10)));
        loop {
            interval.tick().await;
            if watchdog.check() {
                return;
            }
        }
    })
}

fn status_of(controller: &HostController) -> StatusView {
    StatusView {
        name: controller.name().to_string(),
        set_temp: controller.set_temp(),
        position_changing: controller.is_position_changing(),
        encoder_count: controller.encoder().position(),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.status.lock().ok().map(|view| view.clone());
    match view {
        Some(mut view) => {
            view.encoder_count = state.knob.position();
            Json(view).into_response()
        }
        None => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Controller status unavailable",
        ),
    }
}

async fn handle_turn_knob(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("delta") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'delta' parameter");
    };
    let Ok(delta) = value.parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid knob delta");
    };

    let mut step = Field::new("knob_delta", -MAX_KNOB_STEP, MAX_KNOB_STEP, 0, false);
    let delta = step.set_value(delta);
    let position = state.knob.adjust(i64::from(delta));
    info!("knob turned by {delta} to {position}");

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_lamp(State(state): State<AppState>) -> impl IntoResponse {
    let client = state.client.clone();
    let lamp = state.lamp.clone();
    let result =
        tokio::task::spawn_blocking(move || client.relay_state(&lamp.dev_id, &lamp.relay)).await;

    match result {
        Ok(Ok(on)) => Json(LampStatus {
            dev_id: state.lamp.dev_id.clone(),
            on,
        })
        .into_response(),
        Ok(Err(err)) => {
            warn!("lamp state request failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, "Failed to read lamp state")
        }
        Err(err) => {
            warn!("lamp state task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Lamp request aborted")
        }
    }
}

async fn handle_set_lamp(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let on = match value.to_ascii_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'"),
    };

    let client = state.client.clone();
    let lamp = state.lamp.clone();
    let result = tokio::task::spawn_blocking(move || {
        client.set_relay_state(&lamp.dev_id, &lamp.relay, on)
    })
    .await;

    match result {
        Ok(Ok(())) => Json(LampStatus {
            dev_id: state.lamp.dev_id.clone(),
            on,
        })
        .into_response(),
        Ok(Err(err)) => {
            warn!("lamp update failed: {err}");
            error_response(StatusCode::BAD_GATEWAY, "Failed to set lamp state")
        }
        Err(err) => {
            warn!("lamp update task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Lamp request aborted")
        }
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
