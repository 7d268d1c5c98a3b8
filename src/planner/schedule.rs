//! The plan's data model: segments, days, weeks.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use thiserror::Error;

use crate::appointments::ResolvedAppointment;
use crate::geo::GeoPoint;

use super::timegrid;

/// What a travel segment is for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TravelKind {
    /// First leg of the day, from home.
    Departure,
    /// First leg of the day, from the previous overnight's hotel.
    DepartureFromHotel,
    /// Leg between two appointments.
    Travel,
    /// Final leg back home.
    Return,
}

impl TravelKind {
    pub fn tag(self) -> &'static str {
        match self {
            TravelKind::Departure => "departure",
            TravelKind::DepartureFromHotel => "departure_from_hotel",
            TravelKind::Travel => "travel",
            TravelKind::Return => "return",
        }
    }
}

/// Payload of an appointment segment.
#[derive(Clone, Debug)]
pub struct PlannedVisit {
    pub id: String,
    pub customer: String,
    pub address: String,
    pub point: GeoPoint,
    pub city: String,
    pub fixed: bool,
    pub confirmed: bool,
    /// Resolution bottomed out at the country centroid.
    pub low_confidence: bool,
}

impl PlannedVisit {
    pub fn from_resolved(resolved: &ResolvedAppointment) -> PlannedVisit {
        PlannedVisit {
            id: resolved.appointment.id.clone(),
            customer: resolved.appointment.customer.clone(),
            address: resolved.appointment.address.clone(),
            point: resolved.point,
            city: resolved.city.clone(),
            fixed: resolved.appointment.is_fixed,
            confirmed: resolved.is_confirmed(),
            low_confidence: resolved.low_confidence,
        }
    }
}

#[derive(Clone, Debug)]
pub enum SegmentKind {
    Appointment(PlannedVisit),
    Travel {
        kind: TravelKind,
        from_label: String,
        to_label: String,
        distance_km: f64,
    },
    Break,
}

/// A scheduled block of time. `start`/`end` are half-hour aligned; the
/// interval is half-open.
#[derive(Clone, Debug)]
pub struct Segment {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub kind: SegmentKind,
}

impl Segment {
    pub fn duration_hours(&self) -> f64 {
        timegrid::hours_between(self.start, self.end)
    }

    /// Open-ended interval intersection.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_appointment(&self) -> bool {
        matches!(self.kind, SegmentKind::Appointment(_))
    }

    pub fn is_break(&self) -> bool {
        matches!(self.kind, SegmentKind::Break)
    }

    pub fn is_travel(&self) -> bool {
        matches!(self.kind, SegmentKind::Travel { .. })
    }
}

/// Two segments claimed the same time. Recoverable: the placer tries the
/// next window.
#[derive(Debug, Error)]
#[error("segment {new_start}-{new_end} overlaps existing {existing_start}-{existing_end}")]
pub struct PlacementError {
    pub new_start: NaiveTime,
    pub new_end: NaiveTime,
    pub existing_start: NaiveTime,
    pub existing_end: NaiveTime,
}

/// A hotel stay at the end of a Mon-Thu day. The next day starts here.
#[derive(Clone, Debug)]
pub struct Overnight {
    pub city: String,
    pub point: GeoPoint,
    pub reason: String,
    pub check_in: NaiveTime,
    pub hotel_label: String,
}

/// One working day of the plan.
#[derive(Clone, Debug)]
pub struct Day {
    pub date: NaiveDate,
    pub segments: Vec<Segment>,
    pub overnight: Option<Overnight>,
}

impl Day {
    pub fn new(date: NaiveDate) -> Day {
        Day {
            date,
            segments: Vec::new(),
            overnight: None,
        }
    }

    pub fn day_name(&self) -> &'static str {
        match self.date.weekday() {
            Weekday::Mon => "Montag",
            Weekday::Tue => "Dienstag",
            Weekday::Wed => "Mittwoch",
            Weekday::Thu => "Donnerstag",
            Weekday::Fri => "Freitag",
            Weekday::Sat => "Samstag",
            Weekday::Sun => "Sonntag",
        }
    }

    /// Insert a segment, refusing any overlap with what is already placed.
    /// The segment list stays sorted by start time.
    pub fn insert_segment(&mut self, segment: Segment) -> Result<(), PlacementError> {
        if let Some(existing) = self.segments.iter().find(|s| s.overlaps(&segment)) {
            return Err(PlacementError {
                new_start: segment.start,
                new_end: segment.end,
                existing_start: existing.start,
                existing_end: existing.end,
            });
        }
        let at = self
            .segments
            .partition_point(|s| s.start <= segment.start);
        self.segments.insert(at, segment);
        Ok(())
    }

    /// Sum of appointment durations.
    pub fn work_hours(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.is_appointment())
            .map(Segment::duration_hours)
            .sum()
    }

    /// Sum of travel and break durations.
    pub fn travel_hours(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.is_travel() || s.is_break())
            .map(Segment::duration_hours)
            .sum()
    }

    pub fn total_hours(&self) -> f64 {
        self.work_hours() + self.travel_hours()
    }

    pub fn break_hours(&self) -> f64 {
        self.segments
            .iter()
            .filter(|s| s.is_break())
            .map(Segment::duration_hours)
            .sum()
    }

    pub fn appointment_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_appointment()).count()
    }

    pub fn has_appointments(&self) -> bool {
        self.appointment_count() > 0
    }

    pub fn last_visit(&self) -> Option<&PlannedVisit> {
        self.segments.iter().rev().find_map(|s| match &s.kind {
            SegmentKind::Appointment(visit) => Some(visit),
            _ => None,
        })
    }

    pub fn first_visit(&self) -> Option<&PlannedVisit> {
        self.segments.iter().find_map(|s| match &s.kind {
            SegmentKind::Appointment(visit) => Some(visit),
            _ => None,
        })
    }

    /// End of the last segment, if any.
    pub fn last_end(&self) -> Option<NaiveTime> {
        self.segments.iter().map(|s| s.end).max()
    }
}

/// A Monday-anchored five-day plan.
#[derive(Clone, Debug)]
pub struct Week {
    pub week_start: NaiveDate,
    pub days: Vec<Day>,
}

impl Week {
    pub fn new(week_start: NaiveDate) -> Week {
        let days = (0..5)
            .map(|offset| Day::new(week_start + chrono::Duration::days(offset)))
            .collect();
        Week { week_start, days }
    }

    pub fn total_hours(&self) -> f64 {
        self.days.iter().map(Day::total_hours).sum()
    }

    /// Which day (0-4) a date falls on, if inside this week.
    pub fn day_index(&self, date: NaiveDate) -> Option<usize> {
        let offset = (date - self.week_start).num_days();
        if (0..5).contains(&offset) {
            Some(offset as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn travel(start: NaiveTime, end: NaiveTime) -> Segment {
        Segment {
            start,
            end,
            kind: SegmentKind::Travel {
                kind: TravelKind::Travel,
                from_label: "A".into(),
                to_label: "B".into(),
                distance_km: 10.0,
            },
        }
    }

    #[test]
    fn insert_refuses_overlap() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        day.insert_segment(travel(t(9, 0), t(10, 0))).unwrap();
        let err = day.insert_segment(travel(t(9, 30), t(10, 30))).unwrap_err();
        assert_eq!(err.existing_start, t(9, 0));

        // Touching intervals are fine: the intervals are half-open.
        day.insert_segment(travel(t(10, 0), t(10, 30))).unwrap();
        assert_eq!(day.segments.len(), 2);
    }

    #[test]
    fn segments_stay_sorted() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        day.insert_segment(travel(t(14, 0), t(15, 0))).unwrap();
        day.insert_segment(travel(t(9, 0), t(10, 0))).unwrap();
        day.insert_segment(travel(t(11, 0), t(12, 0))).unwrap();
        let starts: Vec<_> = day.segments.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![t(9, 0), t(11, 0), t(14, 0)]);
    }

    #[test]
    fn hour_accounting_splits_work_and_travel() {
        let mut day = Day::new(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        day.insert_segment(travel(t(8, 30), t(9, 30))).unwrap();
        day.insert_segment(Segment {
            start: t(9, 30),
            end: t(12, 30),
            kind: SegmentKind::Appointment(PlannedVisit {
                id: "a".into(),
                customer: "K".into(),
                address: "X".into(),
                point: GeoPoint::new(52.0, 9.0),
                city: "X".into(),
                fixed: false,
                confirmed: true,
                low_confidence: false,
            }),
        })
        .unwrap();
        day.insert_segment(Segment {
            start: t(12, 30),
            end: t(13, 0),
            kind: SegmentKind::Break,
        })
        .unwrap();

        assert_eq!(day.work_hours(), 3.0);
        assert_eq!(day.travel_hours(), 1.5);
        assert_eq!(day.total_hours(), 4.5);
        assert_eq!(day.break_hours(), 0.5);
    }

    #[test]
    fn week_days_and_index() {
        let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let week = Week::new(monday);
        assert_eq!(week.days.len(), 5);
        assert_eq!(week.days[0].day_name(), "Montag");
        assert_eq!(week.days[4].day_name(), "Freitag");
        assert_eq!(week.day_index(monday), Some(0));
        assert_eq!(
            week.day_index(NaiveDate::from_ymd_opt(2025, 6, 6).unwrap()),
            Some(4)
        );
        assert_eq!(
            week.day_index(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()),
            None
        );
    }
}
