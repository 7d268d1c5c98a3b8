//! Planning limits.

use chrono::NaiveTime;

/// Immutable knobs for one planning run.
#[derive(Clone, Copy, Debug)]
pub struct PlanningConfig {
    /// Earliest departure / first appointment time.
    pub work_start: NaiveTime,
    /// Combined appointment + travel + break budget per day.
    pub max_day_hours: f64,
    /// Combined budget per week.
    pub max_week_hours: f64,
    /// Fixed on-site duration of every appointment.
    pub appointment_hours: f64,
    /// A day ending farther than this from home stays in a hotel.
    pub overnight_threshold_km: f64,
    /// Friday's return must arrive home by this time.
    pub friday_return_deadline: NaiveTime,
    /// How many flexible candidates one day is offered.
    pub max_candidates_per_day: usize,
}

impl PlanningConfig {
    /// The legal default: 40 h weeks, 10 h days.
    pub fn strict_40h_10h() -> PlanningConfig {
        PlanningConfig {
            work_start: NaiveTime::from_hms_opt(8, 30, 0).expect("valid time"),
            max_day_hours: 10.0,
            max_week_hours: 40.0,
            appointment_hours: 3.0,
            overnight_threshold_km: 120.0,
            friday_return_deadline: NaiveTime::from_hms_opt(17, 0, 0)
                .expect("valid time"),
            max_candidates_per_day: 6,
        }
    }

    /// Looser variant with early starts and long days. Operational override,
    /// not the default.
    pub fn flex_50h_14h() -> PlanningConfig {
        PlanningConfig {
            work_start: NaiveTime::from_hms_opt(7, 0, 0).expect("valid time"),
            max_day_hours: 14.0,
            max_week_hours: 50.0,
            ..PlanningConfig::strict_40h_10h()
        }
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        PlanningConfig::strict_40h_10h()
    }
}
