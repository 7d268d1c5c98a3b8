//! Rendering a planned week into the caller-facing report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::planner::schedule::{Day, Overnight, Segment, SegmentKind, TravelKind, Week};
use crate::planner::timegrid::hhmm;

/// The structure handed back to the host (and serialized by the CLI).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekReport {
    /// Monday of the planned week.
    pub week_start: NaiveDate,
    pub days: Vec<DayReport>,
    pub total_hours: f64,
    /// Human-readable findings: constraint violations, degraded services,
    /// unplanned appointments.
    pub optimizations: Vec<String>,
    pub stats: WeekStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayReport {
    pub day_name: String,
    pub date: NaiveDate,
    pub segments: Vec<SegmentReport>,
    pub work_hours: f64,
    pub travel_hours: f64,
    pub total_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overnight: Option<OvernightReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReport {
    /// `"HH:MM - HH:MM"`, always half-hour aligned.
    pub time: String,
    /// `appointment`, `departure`, `departure_from_hotel`, `travel`,
    /// `return` or `break`.
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OvernightReport {
    pub city: String,
    pub reason: String,
    pub check_in: String,
    pub hotel: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekStats {
    pub total_appointments: usize,
    pub confirmed_appointments: usize,
    pub proposal_appointments: usize,
    /// Hours on the road, breaks included.
    pub total_travel_time: f64,
    /// Days carrying at least one appointment.
    pub work_days: usize,
    pub overnight_stays: usize,
}

/// Render a finished week. `optimizations` carries whatever the planner
/// collected along the way.
pub fn render_week(week: &Week, optimizations: Vec<String>) -> WeekReport {
    let days: Vec<DayReport> = week.days.iter().map(render_day).collect();

    let mut confirmed = 0;
    let mut proposals = 0;
    for day in &week.days {
        for segment in &day.segments {
            if let SegmentKind::Appointment(visit) = &segment.kind {
                if visit.confirmed {
                    confirmed += 1;
                } else {
                    proposals += 1;
                }
            }
        }
    }

    let stats = WeekStats {
        total_appointments: confirmed + proposals,
        confirmed_appointments: confirmed,
        proposal_appointments: proposals,
        total_travel_time: round2(week.days.iter().map(Day::travel_hours).sum()),
        work_days: week.days.iter().filter(|d| d.has_appointments()).count(),
        overnight_stays: week.days.iter().filter(|d| d.overnight.is_some()).count(),
    };

    WeekReport {
        week_start: week.week_start,
        days,
        total_hours: round2(week.total_hours()),
        optimizations,
        stats,
        generated_at: Utc::now(),
    }
}

fn render_day(day: &Day) -> DayReport {
    DayReport {
        day_name: day.day_name().to_owned(),
        date: day.date,
        segments: day.segments.iter().map(render_segment).collect(),
        work_hours: round2(day.work_hours()),
        travel_hours: round2(day.travel_hours()),
        total_hours: round2(day.total_hours()),
        overnight: day.overnight.as_ref().map(render_overnight),
    }
}

fn render_segment(segment: &Segment) -> SegmentReport {
    let time = format!("{} - {}", hhmm(segment.start), hhmm(segment.end));
    let (kind, label) = match &segment.kind {
        SegmentKind::Appointment(visit) => {
            let mut label = format!("Termin: {} ({})", visit.customer, visit.city);
            if visit.low_confidence {
                label.push_str(" [ungenaue Ortung]");
            }
            ("appointment".to_owned(), label)
        }
        SegmentKind::Travel {
            kind,
            from_label,
            to_label,
            distance_km,
        } => {
            let verb = match kind {
                TravelKind::Departure => "Abfahrt",
                TravelKind::DepartureFromHotel => "Abfahrt vom Hotel",
                TravelKind::Travel => "Fahrt",
                TravelKind::Return => "Rückfahrt",
            };
            (
                kind.tag().to_owned(),
                format!("{}: {} → {} ({:.0} km)", verb, from_label, to_label, distance_km),
            )
        }
        SegmentKind::Break => ("break".to_owned(), "Pause".to_owned()),
    };
    SegmentReport { time, kind, label }
}

fn render_overnight(overnight: &Overnight) -> OvernightReport {
    OvernightReport {
        city: overnight.city.clone(),
        reason: overnight.reason.clone(),
        check_in: hhmm(overnight.check_in),
        hotel: overnight.hotel_label.clone(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
