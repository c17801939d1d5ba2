use crate::error::ServerError;

/// Remote authority for a controller's set-temperature.
///
/// Implementations may block on network I/O for up to their configured
/// timeout. There is no cancellation.
pub trait SetTempStore {
    /// Sends a new set-temperature. `Ok(Some(t))` carries the value the
    /// server echoed back, `Ok(None)` means the write landed without one.
    fn push_set_temperature(
        &mut self,
        controller_id: &str,
        set_temp: f32,
    ) -> Result<Option<f32>, ServerError>;

    fn pull_set_temperature(&mut self, controller_id: &str) -> Result<f32, ServerError>;
}
