use std::fmt;

/// A named integer bounded to `[min, max]`.
///
/// Out-of-range input either clamps to the nearest bound or, with `wrap`
/// set, jumps to the opposite bound. Wrapping is a single step: anything
/// below `min` becomes `max` no matter how far below it was.
///
/// `min <= max` is a caller precondition and is not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    value: i32,
    min: i32,
    max: i32,
    wrap: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, min: i32, max: i32, initial: i32, wrap: bool) -> Self {
        Self {
            name: name.into(),
            value: initial,
            min,
            max,
            wrap,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn set_value(&mut self, value: i32) -> i32 {
        self.value = if value < self.min {
            if self.wrap {
                self.max
            } else {
                self.min
            }
        } else if value > self.max {
            if self.wrap {
                self.min
            } else {
                self.max
            }
        } else {
            value
        };
        self.value
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
