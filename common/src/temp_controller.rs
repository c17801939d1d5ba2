use log::{debug, info, warn};

use crate::{
    config::TempControllerConfig,
    display::DisplaySink,
    encoder::Encoder,
    error::ServerError,
    store::SetTempStore,
    timer::{Clock, Timer},
};

/// Something the main loop polls.
pub trait Controller {
    /// Returns `true` when the controller evaluated this cycle, `false` when
    /// it was not yet due. Says nothing about whether network calls worked.
    fn update(&mut self) -> bool;
}

/// Keeps a knob-driven set-temperature in step with the control server.
///
/// While the knob is turning, the local value follows the encoder and the
/// server is left alone. Once the knob has been still for the
/// stabilization period the value is pushed and read back. Otherwise the
/// server's value is pulled every `server_request_period_ms`.
pub struct TempController<C, E, S> {
    config: TempControllerConfig,
    set_temp: f32,
    last_position: i64,
    position_changing: bool,
    encoder: E,
    store: S,
    display: Option<Box<dyn DisplaySink + Send>>,
    update_timer: Timer<C>,
    position_changing_timer: Timer<C>,
    server_request_timer: Timer<C>,
}

impl<C, E, S> TempController<C, E, S>
where
    C: Clock + Clone,
    E: Encoder,
    S: SetTempStore,
{
    pub fn new(
        config: TempControllerConfig,
        clock: C,
        encoder: E,
        store: S,
        display: Option<Box<dyn DisplaySink + Send>>,
    ) -> Self {
        let update_timer = Timer::new(config.update_period_ms, clock.clone());
        let position_changing_timer =
            Timer::new(config.position_changing_timeout_ms, clock.clone());
        let server_request_timer = Timer::new(config.server_request_period_ms, clock);

        let mut controller = Self {
            set_temp: config.initial_set_temp,
            last_position: 0,
            position_changing: false,
            config,
            encoder,
            store,
            display,
            update_timer,
            position_changing_timer,
            server_request_timer,
        };
        controller.last_position = controller.temp_to_count(controller.set_temp);
        controller
    }

    /// Moves the encoder to match the current set-temperature.
    pub fn init(&mut self) {
        self.sync_encoder();
    }

    pub fn set_temp(&self) -> f32 {
        self.set_temp
    }

    pub fn is_position_changing(&self) -> bool {
        self.position_changing
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn temp_to_count(&self, temp: f32) -> i64 {
        (temp * self.config.multiplier).round() as i64
    }

    /// Rounds to the nearest tenth of a degree.
    pub fn count_to_temp(&self, count: i64) -> f32 {
        (count as f32 / self.config.multiplier * 10.0).round() / 10.0
    }

    fn on_position_changed(&mut self, position: i64) {
        self.position_changing = true;
        self.position_changing_timer.reset();
        debug!("{}: position {position}", self.config.name);

        // Bounds need not sit on a whole count, so clamp in degrees.
        let temp = self.count_to_temp(position);
        self.set_temp = if temp > self.config.max_safe_temp {
            self.config.max_safe_temp
        } else if temp < self.config.min_safe_temp {
            self.config.min_safe_temp
        } else {
            temp
        };
    }

    fn push_to_server(&mut self) {
        let name = self.config.name.clone();
        let pushed = self.set_temp;
        match self.store.push_set_temperature(&name, pushed) {
            Ok(echoed) => {
                info!("{name}: set temp {pushed:.1} sent to server");
                if let Some(echoed) = echoed {
                    self.accept_server_value(echoed);
                }
            }
            Err(err) => warn!("{name}: pushing set temp {pushed:.1} failed: {err}"),
        }
    }

    fn pull_from_server(&mut self) {
        let name = self.config.name.clone();
        match self.store.pull_set_temperature(&name) {
            Ok(value) => self.accept_server_value(value),
            Err(err) => warn!("{name}: pulling set temp failed: {err}"),
        }
    }

    fn accept_server_value(&mut self, value: f32) {
        if !value.is_finite() {
            warn!(
                "{}: ignoring server value: {}",
                self.config.name,
                ServerError::InvalidValue(value)
            );
            return;
        }
        if (value - self.set_temp).abs() > f32::EPSILON {
            info!(
                "{}: set temp {:.1} -> {value:.1} from server",
                self.config.name, self.set_temp
            );
        }
        self.set_temp = value;
    }

    fn sync_encoder(&mut self) {
        let count = self.temp_to_count(self.set_temp);
        self.encoder.set_position(count);
        self.last_position = count;
    }
}

impl<C, E, S> Controller for TempController<C, E, S>
where
    C: Clock + Clone,
    E: Encoder,
    S: SetTempStore,
{
    fn update(&mut self) -> bool {
        if !self.update_timer.expired() {
            return false;
        }
        self.update_timer.reset();

        let position = self.encoder.position();
        let mut settled = false;
        if position != self.last_position {
            self.on_position_changed(position);
        } else if self.position_changing && self.position_changing_timer.expired() {
            self.position_changing = false;
            self.push_to_server();
            self.pull_from_server();
            self.server_request_timer.reset();
            settled = true;
        }

        // Never poll while the knob is moving, and never twice in one cycle.
        if !settled && !self.position_changing && self.server_request_timer.expired() {
            self.pull_from_server();
            self.server_request_timer.reset();
        }

        self.sync_encoder();

        if let Some(display) = self.display.as_mut() {
            display.update(self.set_temp);
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{encoder::SharedEncoder, timer::ManualClock};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Push(f32),
        Pull,
    }

    /// Server double. Pulls return `value` unless a scripted result is
    /// queued; pushes store the value they were given.
    #[derive(Clone, Default)]
    struct MockStore {
        inner: Arc<Mutex<MockInner>>,
    }

    #[derive(Default)]
    struct MockInner {
        value: f32,
        calls: Vec<Call>,
        scripted_pulls: VecDeque<Result<f32, ServerError>>,
        fail_push: bool,
    }

    impl MockStore {
        fn with_value(value: f32) -> Self {
            let store = Self::default();
            store.inner.lock().unwrap().value = value;
            store
        }

        fn set_value(&self, value: f32) {
            self.inner.lock().unwrap().value = value;
        }

        fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        fn clear_calls(&self) {
            self.inner.lock().unwrap().calls.clear();
        }
    }

    impl SetTempStore for MockStore {
        fn push_set_temperature(
            &mut self,
            _controller_id: &str,
            set_temp: f32,
        ) -> Result<Option<f32>, ServerError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Push(set_temp));
            if inner.fail_push {
                return Err(ServerError::Timeout(3_000));
            }
            inner.value = set_temp;
            Ok(Some(set_temp))
        }

        fn pull_set_temperature(&mut self, _controller_id: &str) -> Result<f32, ServerError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Pull);
            match inner.scripted_pulls.pop_front() {
                Some(result) => result,
                None => Ok(inner.value),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Shown(Arc<Mutex<Vec<f32>>>);

    impl DisplaySink for Shown {
        fn update(&mut self, value: f32) {
            self.0.lock().unwrap().push(value);
        }
    }

    struct Rig {
        clock: ManualClock,
        knob: SharedEncoder,
        store: MockStore,
        shown: Shown,
        controller: TempController<ManualClock, SharedEncoder, MockStore>,
    }

    impl Rig {
        fn new(server_value: f32) -> Self {
            let clock = ManualClock::new(0);
            let knob = SharedEncoder::new(0);
            let store = MockStore::with_value(server_value);
            let shown = Shown::default();
            let mut controller = TempController::new(
                TempControllerConfig::default(),
                clock.clone(),
                knob.clone(),
                store.clone(),
                Some(Box::new(shown.clone())),
            );
            controller.init();
            Self {
                clock,
                knob,
                store,
                shown,
                controller,
            }
        }

        /// Advances time in 100 ms steps, calling `update()` after each.
        fn run_for(&mut self, ms: u64) {
            for _ in 0..ms / 100 {
                self.clock.advance(100);
                self.controller.update();
            }
        }
    }

    #[test]
    fn init_moves_encoder_to_initial_temp() {
        let rig = Rig::new(68.0);
        assert_eq!(rig.knob.position(), 680);
        assert_eq!(rig.controller.set_temp(), 68.0);
    }

    #[test]
    fn update_is_gated_by_period() {
        let mut rig = Rig::new(68.0);

        assert!(rig.controller.update());
        assert!(!rig.controller.update());

        rig.clock.advance(99);
        assert!(!rig.controller.update());
        rig.clock.advance(1);
        assert!(rig.controller.update());
    }

    #[test]
    fn count_conversions_round_trip_within_tolerance() {
        let rig = Rig::new(68.0);
        for tenths in 400..900 {
            let temp = tenths as f32 / 10.0 + 0.03;
            let back = rig.controller.count_to_temp(rig.controller.temp_to_count(temp));
            assert!((back - temp).abs() <= 0.05 + 1e-4, "{temp} -> {back}");
        }

        for multiplier in [2.0_f32, 4.0, 10.0, 20.0] {
            let controller = TempController::new(
                TempControllerConfig {
                    multiplier,
                    ..TempControllerConfig::default()
                },
                ManualClock::new(0),
                SharedEncoder::new(0),
                MockStore::default(),
                None,
            );
            let count = controller.temp_to_count(68.0);
            assert_eq!(controller.count_to_temp(count), 68.0);
        }
    }

    #[test]
    fn knob_turn_follows_encoder() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();

        rig.knob.adjust(15);
        rig.run_for(100);

        assert!(rig.controller.is_position_changing());
        assert_eq!(rig.controller.set_temp(), 69.5);
        assert_eq!(rig.knob.position(), 695);
    }

    #[test]
    fn knob_above_safe_range_is_clamped() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();

        rig.knob.set_position(990);
        rig.run_for(100);

        assert_eq!(rig.controller.set_temp(), 75.0);
        assert_eq!(rig.knob.position(), 750);
    }

    #[test]
    fn knob_below_safe_range_is_clamped() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();

        rig.knob.set_position(-40);
        rig.run_for(100);

        assert_eq!(rig.controller.set_temp(), 50.0);
        assert_eq!(rig.knob.position(), 500);
    }

    #[test]
    fn clamp_holds_for_bounds_between_counts() {
        let mut config = TempControllerConfig {
            multiplier: 4.0,
            min_safe_temp: 50.1,
            max_safe_temp: 74.9,
            ..TempControllerConfig::default()
        };
        config.sanitize();
        let clock = ManualClock::new(0);
        let mut knob = SharedEncoder::new(0);
        let mut controller = TempController::new(
            config,
            clock.clone(),
            knob.clone(),
            MockStore::with_value(68.0),
            None,
        );
        controller.init();
        controller.update();

        for (position, expected) in [(400, 74.9), (0, 50.1), (299, 74.8), (201, 50.3)] {
            knob.set_position(position);
            clock.advance(100);
            assert!(controller.update());

            let set_temp = controller.set_temp();
            assert!(
                (50.1..=74.9).contains(&set_temp),
                "position {position} gave {set_temp}"
            );
            assert_eq!(set_temp, expected);
        }
    }

    #[test]
    fn settled_knob_pushes_once_then_pulls() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        rig.store.clear_calls();

        rig.knob.adjust(20);
        rig.run_for(100);
        assert!(rig.controller.is_position_changing());

        // Still within the stabilization window: no server traffic.
        rig.run_for(1_900);
        assert!(rig.controller.is_position_changing());
        assert!(rig.store.calls().is_empty());

        rig.run_for(100);
        assert!(!rig.controller.is_position_changing());
        assert_eq!(rig.store.calls(), vec![Call::Push(70.0), Call::Pull]);
        assert_eq!(rig.controller.set_temp(), 70.0);

        // Knob idle afterwards: no further push, no echo treated as movement.
        rig.run_for(1_000);
        assert_eq!(rig.store.calls(), vec![Call::Push(70.0), Call::Pull]);
        assert_eq!(rig.knob.position(), 700);
    }

    #[test]
    fn continued_turning_restarts_stabilization() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        rig.store.clear_calls();

        for _ in 0..5 {
            rig.knob.adjust(1);
            rig.run_for(1_500);
        }
        assert!(rig.controller.is_position_changing());
        assert!(rig.store.calls().is_empty());

        rig.run_for(600);
        assert_eq!(rig.store.calls(), vec![Call::Push(68.5), Call::Pull]);
    }

    #[test]
    fn idle_sync_overwrites_local_value() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        assert_eq!(rig.store.calls(), vec![Call::Pull]);

        rig.store.set_value(72.5);
        rig.run_for(4_900);
        assert_eq!(rig.controller.set_temp(), 68.0);

        rig.run_for(100);
        assert_eq!(rig.controller.set_temp(), 72.5);
        assert_eq!(rig.knob.position(), 725);
        assert!(!rig.controller.is_position_changing());
    }

    #[test]
    fn failed_pull_keeps_previous_value() {
        let mut rig = Rig::new(71.0);
        rig.controller.update();
        assert_eq!(rig.controller.set_temp(), 71.0);

        rig.store
            .inner
            .lock()
            .unwrap()
            .scripted_pulls
            .extend([Err(ServerError::Timeout(3_000)), Ok(f32::NAN)]);

        rig.run_for(5_000);
        assert_eq!(rig.controller.set_temp(), 71.0);
        rig.run_for(5_000);
        assert_eq!(rig.controller.set_temp(), 71.0);
    }

    #[test]
    fn failed_push_still_settles() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        rig.store.inner.lock().unwrap().fail_push = true;

        rig.knob.adjust(10);
        rig.run_for(2_100);

        assert!(!rig.controller.is_position_changing());
        // The follow-up pull returns the server's unchanged value.
        assert_eq!(rig.controller.set_temp(), 68.0);
        assert_eq!(rig.knob.position(), 680);
    }

    #[test]
    fn push_and_periodic_pull_never_share_a_cycle() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        rig.store.clear_calls();

        // Line the settle moment up with the periodic sync deadline.
        rig.run_for(2_900);
        rig.knob.adjust(5);
        rig.run_for(2_100);

        assert_eq!(rig.store.calls(), vec![Call::Push(68.5), Call::Pull]);
    }

    #[test]
    fn display_receives_every_evaluated_cycle() {
        let mut rig = Rig::new(68.0);
        rig.controller.update();
        rig.run_for(300);

        assert_eq!(*rig.shown.0.lock().unwrap(), vec![68.0; 4]);
    }

    #[test]
    fn reports_server_change_once_after_first_sync_period() {
        let clock = ManualClock::new(0);
        let knob = SharedEncoder::new(0);
        let store = MockStore::with_value(68.0);
        let shown = Shown::default();
        let mut controller = TempController::new(
            TempControllerConfig {
                update_period_ms: 100,
                server_request_period_ms: 5_000,
                initial_set_temp: 68.0,
                multiplier: 10.0,
                name: "lr_temp".to_string(),
                ..TempControllerConfig::default()
            },
            clock.clone(),
            knob,
            store.clone(),
            Some(Box::new(shown.clone())),
        );
        controller.init();

        let mut transitions = Vec::new();
        let mut previous = controller.set_temp();
        for step in 0..=120_u64 {
            let now = step * 100;
            clock.set(now);
            if now >= 100 {
                store.set_value(70.0);
            }
            controller.update();
            if controller.set_temp() != previous {
                transitions.push((now, previous, controller.set_temp()));
                previous = controller.set_temp();
            }
        }

        assert_eq!(transitions.len(), 1);
        let (at, from, to) = transitions[0];
        assert!(at >= 5_000, "changed at {at} ms");
        assert_eq!((from, to), (68.0, 70.0));
        assert_eq!(shown.0.lock().unwrap().last(), Some(&70.0));
    }
}
