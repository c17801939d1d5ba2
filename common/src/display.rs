/// Anything that can show the current set-temperature.
pub trait DisplaySink {
    fn update(&mut self, value: f32);
}

impl<F: FnMut(f32)> DisplaySink for F {
    fn update(&mut self, value: f32) {
        self(value)
    }
}

/// Forwards to `inner` only when the whole-degree value changes, so a
/// renderer is not redrawn on every control cycle.
pub struct SetTempDisplay<D> {
    inner: D,
    previous: Option<i32>,
}

impl<D: DisplaySink> SetTempDisplay<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            previous: None,
        }
    }
}

impl<D: DisplaySink> DisplaySink for SetTempDisplay<D> {
    fn update(&mut self, value: f32) {
        let whole = value.round() as i32;
        if self.previous == Some(whole) {
            return;
        }
        self.previous = Some(whole);
        self.inner.update(value);
    }
}
