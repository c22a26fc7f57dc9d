// 📏 Measurement - One metering point's energy for one interval
//
// All values are kWh. Consumers are stored as positive consumption even though
// the export writes them as negative numbers.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Energy before the grid operator applied sharing
    pub before: f64,

    /// Energy after sharing was applied
    pub after: f64,

    /// Energy that could have been shared but was not
    pub missed: f64,
}

impl Measurement {
    pub fn new(before: f64, after: f64, missed: f64) -> Self {
        Measurement {
            before,
            after,
            missed,
        }
    }

    /// Energy moved by sharing (before - after)
    pub fn shared(&self) -> f64 {
        self.before - self.after
    }
}

impl Add for Measurement {
    type Output = Measurement;

    fn add(self, other: Measurement) -> Measurement {
        Measurement {
            before: self.before + other.before,
            after: self.after + other.after,
            missed: self.missed + other.missed,
        }
    }
}

impl AddAssign for Measurement {
    fn add_assign(&mut self, other: Measurement) {
        *self = *self + other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_sum_is_element_wise() {
        let a = Measurement::new(1.0, 0.25, 0.5);
        let b = Measurement::new(2.0, 0.75, 0.0);

        let sum = a + b;
        assert_eq!(sum, Measurement::new(3.0, 1.0, 0.5));
        assert_eq!(sum.shared(), 2.0);
    }
}
