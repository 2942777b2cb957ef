//! Slow-field refresh scheduling
//!
//! Tube sensitivity, device id and battery voltage change rarely, so they are
//! read every N poll cycles instead of on every cycle.

use crate::config::PollerConfig;

/// Which slow fields to read in the current cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    pub sensitivity: bool,
    pub device_info: bool,
}

/// Cycle counter deciding when slow fields are due
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    cycle: u64,
    sensitivity_period: u64,
    device_info_period: u64,
    forced: bool,
}

impl RefreshSchedule {
    /// Periods are in poll cycles; zero is treated as one
    pub fn new(sensitivity_period: u64, device_info_period: u64) -> Self {
        Self {
            cycle: 0,
            sensitivity_period: sensitivity_period.max(1),
            device_info_period: device_info_period.max(1),
            forced: false,
        }
    }

    pub fn from_config(config: &PollerConfig) -> Self {
        Self::new(config.sensitivity_period(), config.device_info_period())
    }

    /// Advance to the next cycle and return what is due in it
    pub fn next_cycle(&mut self) -> RefreshPlan {
        self.cycle = self.cycle.wrapping_add(1);
        let forced = std::mem::take(&mut self.forced);
        RefreshPlan {
            sensitivity: forced || self.cycle % self.sensitivity_period == 0,
            device_info: forced || self.cycle % self.device_info_period == 0,
        }
    }

    /// Make every slow field due in the next cycle
    pub fn force(&mut self) {
        self.forced = true;
    }

    /// Number of cycles started so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_due_on_their_period() {
        let mut schedule = RefreshSchedule::new(3, 2);
        let plans: Vec<_> = (0..6).map(|_| schedule.next_cycle()).collect();

        let sensitivity: Vec<_> = plans.iter().map(|p| p.sensitivity).collect();
        let device_info: Vec<_> = plans.iter().map(|p| p.device_info).collect();
        assert_eq!(sensitivity, [false, false, true, false, false, true]);
        assert_eq!(device_info, [false, true, false, true, false, true]);
    }

    #[test]
    fn test_period_of_one_is_every_cycle() {
        let mut schedule = RefreshSchedule::new(0, 1);
        for _ in 0..4 {
            assert_eq!(
                schedule.next_cycle(),
                RefreshPlan {
                    sensitivity: true,
                    device_info: true
                }
            );
        }
    }

    #[test]
    fn test_force_applies_once() {
        let mut schedule = RefreshSchedule::new(100, 100);
        schedule.force();
        assert!(schedule.next_cycle().sensitivity);
        assert_eq!(schedule.next_cycle(), RefreshPlan::default());
        assert_eq!(schedule.cycle(), 2);
    }
}
