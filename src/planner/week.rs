//! Week orchestration.
//!
//! Fixed appointments are pinned to their days first; flexible ones flow
//! through a region-ordered queue, up to six offered per day, until the
//! weekly budget runs dry. Every day is closed by the day planner, so fixed
//! days get their morning and evening legs even when no flexible work lands
//! on them.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use metrics::{counter, describe_counter};
use tracing::{debug, info, warn};

use crate::appointments::{Appointment, ResolvedAppointment};
use crate::distance::DistanceOracle;
use crate::geo::HOME_BASE;
use crate::geocoders::Geocoder;
use crate::report::{render_week, WeekReport};
use crate::Result;

use super::config::PlanningConfig;
use super::day::{DayContext, DayPlanner};
use super::regions::{cluster, region_order, ALL_REGIONS};
use super::schedule::{PlannedVisit, Segment, SegmentKind, Week};
use super::timegrid::snap_up;

pub struct WeekPlanner {
    config: PlanningConfig,
    geocoder: Arc<Geocoder>,
    oracle: Arc<DistanceOracle>,
}

impl WeekPlanner {
    pub fn new(
        config: PlanningConfig,
        geocoder: Arc<Geocoder>,
        oracle: Arc<DistanceOracle>,
    ) -> WeekPlanner {
        describe_counter!(
            "tourenplan.plan.appointments.total",
            "Appointments offered to the week planner"
        );

        WeekPlanner {
            config,
            geocoder,
            oracle,
        }
    }

    /// Build the five-day plan for the week starting at `week_start`.
    pub async fn plan(
        &self,
        appointments: &[Appointment],
        week_start: NaiveDate,
    ) -> Result<WeekReport> {
        if week_start.weekday() != Weekday::Mon {
            warn!(%week_start, "week start is not a Monday");
        }
        counter!(
            "tourenplan.plan.appointments.total",
            appointments.len() as u64
        );

        let mut notes = Vec::new();
        let resolved = self.resolve_all(appointments).await;

        let low_confidence = resolved.iter().filter(|r| r.low_confidence).count();
        if low_confidence > 0 {
            notes.push(format!(
                "{} Termin(e) nur landesweit geortet, Planung ungenau",
                low_confidence
            ));
        }

        let mut week = Week::new(week_start);
        let flexible = self.place_fixed(&mut week, resolved, &mut notes);
        let mut queue = build_queue(flexible);

        let day_planner = DayPlanner::new(&self.config, &self.oracle);
        for day_idx in 0..week.days.len() {
            let ctx = self.day_context(&week, day_idx);
            let candidates = if ctx.day_budget_hours >= self.config.appointment_hours {
                take_candidates(&mut queue, self.config.max_candidates_per_day)
            } else {
                Vec::new()
            };

            debug!(
                day = day_idx,
                candidates = candidates.len(),
                budget = ctx.day_budget_hours,
                "filling day"
            );
            let day = &mut week.days[day_idx];
            let outcome = day_planner.fill_day(day, candidates, &ctx).await;

            for leftover in outcome.remaining.into_iter().rev() {
                queue.push_front(leftover);
            }
            notes.extend(outcome.notes);
        }

        if !queue.is_empty() {
            notes.push(format!(
                "{} Termin(e) nicht eingeplant (Wochenbudget erschöpft)",
                queue.len()
            ));
        }
        if self.geocoder.was_degraded() {
            notes.push(
                "Geocoding-Dienst hat Anfragen gedrosselt, Planung eingeschränkt"
                    .to_owned(),
            );
        }

        info!(
            total_hours = week.total_hours(),
            unplanned = queue.len(),
            "week planned"
        );
        Ok(render_week(&week, notes))
    }

    /// Resolve coordinates for every appointment, in input order.
    async fn resolve_all(&self, appointments: &[Appointment]) -> Vec<ResolvedAppointment> {
        let mut resolved = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let entry = match appointment.precomputed_point() {
                Some(point) => {
                    ResolvedAppointment::from_precomputed(appointment.clone(), point)
                }
                None => {
                    let geocode = self.geocoder.resolve(&appointment.address).await;
                    ResolvedAppointment::from_geocode(appointment.clone(), &geocode)
                }
            };
            resolved.push(entry);
        }
        resolved
    }

    /// Pin fixed appointments to their days; everything else comes back as
    /// the flexible pool.
    fn place_fixed(
        &self,
        week: &mut Week,
        resolved: Vec<ResolvedAppointment>,
        notes: &mut Vec<String>,
    ) -> Vec<ResolvedAppointment> {
        let mut flexible = Vec::new();

        for entry in resolved {
            if !entry.appointment.is_fixed {
                flexible.push(entry);
                continue;
            }
            let Some(date) = entry.appointment.fixed_date else {
                warn!(id = %entry.appointment.id, "fixed appointment without date");
                flexible.push(entry);
                continue;
            };
            let Some(day_idx) = week.day_index(date) else {
                notes.push(format!(
                    "Fixtermin {} liegt außerhalb der Woche ({})",
                    entry.appointment.id, date
                ));
                continue;
            };

            let start = snap_up(
                entry
                    .appointment
                    .fixed_time
                    .unwrap_or(self.config.work_start),
            );
            let end = super::timegrid::add_hours(start, self.config.appointment_hours);
            let segment = Segment {
                start,
                end,
                kind: SegmentKind::Appointment(PlannedVisit::from_resolved(&entry)),
            };
            if let Err(err) = week.days[day_idx].insert_segment(segment) {
                notes.push(format!(
                    "Terminkonflikt: Fixtermin {} um {} nicht platzierbar ({})",
                    entry.appointment.id, start, err
                ));
            }
        }
        flexible
    }

    fn day_context(&self, week: &Week, day_idx: usize) -> DayContext {
        let overnight = day_idx
            .checked_sub(1)
            .and_then(|prev| week.days[prev].overnight.clone());
        let remaining_week = (self.config.max_week_hours - week.total_hours()).max(0.0);

        match overnight {
            Some(overnight) => DayContext {
                start_point: overnight.point,
                start_label: overnight.city,
                from_hotel: true,
                is_friday: day_idx == 4,
                day_budget_hours: self.config.max_day_hours.min(remaining_week),
            },
            None => DayContext {
                start_point: HOME_BASE,
                start_label: "Hannover".to_owned(),
                from_hotel: false,
                is_friday: day_idx == 4,
                day_budget_hours: self.config.max_day_hours.min(remaining_week),
            },
        }
    }
}

/// One queue for the whole week: regions in ascending home distance, each
/// region's appointments sorted confirmed-first, then oldest pipeline first.
fn build_queue(flexible: Vec<ResolvedAppointment>) -> VecDeque<ResolvedAppointment> {
    let mut buckets = cluster(flexible);
    let order = region_order(&HOME_BASE);

    let mut queue = VecDeque::new();
    for region in order {
        let idx = ALL_REGIONS
            .iter()
            .position(|r| *r == region)
            .expect("region is in ALL_REGIONS");
        let mut bucket = std::mem::take(&mut buckets[idx]);
        bucket.sort_by_key(|r| {
            (
                std::cmp::Reverse(r.is_confirmed()),
                std::cmp::Reverse(r.appointment.pipeline_days),
            )
        });
        queue.extend(bucket);
    }
    queue
}

fn take_candidates(
    queue: &mut VecDeque<ResolvedAppointment>,
    max: usize,
) -> Vec<ResolvedAppointment> {
    let take = max.min(queue.len());
    queue.drain(..take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointments::AppointmentStatus;

    fn flexible(id: &str, status: AppointmentStatus, pipeline_days: i64, lat: f64, lng: f64) -> ResolvedAppointment {
        let appointment: Appointment = serde_json::from_value(serde_json::json!({
            "id": id,
            "customer": id,
            "address": "x",
            "status": if status == AppointmentStatus::Confirmed { "bestätigt" } else { "vorschlag" },
            "pipelineDays": pipeline_days,
        }))
        .unwrap();
        ResolvedAppointment::from_precomputed(appointment, crate::geo::GeoPoint::new(lat, lng))
    }

    #[test]
    fn queue_orders_regions_then_status_then_age() {
        // Two in the north (near Hamburg), two in the south (near Munich).
        let entries = vec![
            flexible("sued-old", AppointmentStatus::Proposed, 40, 48.14, 11.58),
            flexible("nord-proposed", AppointmentStatus::Proposed, 10, 53.55, 9.99),
            flexible("nord-confirmed", AppointmentStatus::Confirmed, 5, 53.6, 10.0),
            flexible("sued-confirmed", AppointmentStatus::Confirmed, 3, 48.2, 11.5),
        ];
        let queue = build_queue(entries);
        let ids: Vec<_> = queue.iter().map(|r| r.appointment.id.as_str()).collect();
        // North region first (closest to Hannover), confirmed before
        // proposed within a region.
        assert_eq!(
            ids,
            vec!["nord-confirmed", "nord-proposed", "sued-confirmed", "sued-old"]
        );
    }

    #[test]
    fn take_candidates_caps_at_queue_length() {
        let mut queue = build_queue(vec![flexible(
            "a",
            AppointmentStatus::Confirmed,
            1,
            52.0,
            9.0,
        )]);
        let taken = take_candidates(&mut queue, 6);
        assert_eq!(taken.len(), 1);
        assert!(queue.is_empty());
    }
}
