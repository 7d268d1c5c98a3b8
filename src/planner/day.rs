//! Single-day placement.
//!
//! Two modes: days that already carry fixed appointments are gap-filled
//! around them; free days are built as a nearest-first sequence from the
//! day's start location. Both modes share break insertion and the day-close
//! rules (return home vs. hotel overnight, Friday's 17:00 hard deadline).

use chrono::NaiveTime;
use tracing::{debug, warn};

use crate::appointments::ResolvedAppointment;
use crate::distance::{DistanceOracle, TRAVEL_PAD_HOURS};
use crate::geo::{GeoPoint, HOME_BASE};

use super::config::PlanningConfig;
use super::schedule::{Day, Overnight, PlannedVisit, Segment, SegmentKind, TravelKind};
use super::timegrid::{add_hours, hhmm, hours_between, snap_down, snap_nearest, snap_up};

/// Assumed speed for feasibility guesses. Real legs come from the oracle
/// once a window is accepted.
const ESTIMATE_SPEED_KMH: f64 = 80.0;

/// Road factor applied to great-circle distance in estimates.
const ESTIMATE_ROAD_FACTOR: f64 = 1.3;

/// Where and how a day starts, and how much of the week is left for it.
#[derive(Clone, Debug)]
pub struct DayContext {
    pub start_point: GeoPoint,
    pub start_label: String,
    pub from_hotel: bool,
    pub is_friday: bool,
    /// `min(max_day_hours, remaining week budget)`.
    pub day_budget_hours: f64,
}

/// What a day's placement pass hands back to the week planner.
#[derive(Debug, Default)]
pub struct DayOutcome {
    /// Candidates that did not fit, in requeue order.
    pub remaining: Vec<ResolvedAppointment>,
    /// Constraint violations and other report-worthy findings.
    pub notes: Vec<String>,
}

pub struct DayPlanner<'a> {
    config: &'a PlanningConfig,
    oracle: &'a DistanceOracle,
}

impl<'a> DayPlanner<'a> {
    pub fn new(config: &'a PlanningConfig, oracle: &'a DistanceOracle) -> DayPlanner<'a> {
        DayPlanner { config, oracle }
    }

    /// Place `candidates` on `day` and close it out. Fixed segments already
    /// on the day are worked around, never moved.
    pub async fn fill_day(
        &self,
        day: &mut Day,
        candidates: Vec<ResolvedAppointment>,
        ctx: &DayContext,
    ) -> DayOutcome {
        let remaining = if day.has_appointments() {
            self.gap_fill(day, candidates, ctx).await
        } else {
            self.sequence(day, candidates, ctx).await
        };

        let mut notes = Vec::new();
        self.close_day(day, ctx, &mut notes).await;
        DayOutcome { remaining, notes }
    }

    /// Gap-fill mode: fit candidates into the open windows around the
    /// day's fixed segments.
    async fn gap_fill(
        &self,
        day: &mut Day,
        candidates: Vec<ResolvedAppointment>,
        ctx: &DayContext,
    ) -> Vec<ResolvedAppointment> {
        let deadline = self.day_deadline(ctx);
        let mut remaining = Vec::new();

        for candidate in candidates {
            if self.try_place_in_window(day, &candidate, ctx, deadline).await {
                self.insert_due_break(day, Some(deadline));
            } else {
                debug!(id = %candidate.appointment.id, "no window fits, requeueing");
                remaining.push(candidate);
            }
        }
        remaining
    }

    /// Try every open window in order; place the candidate into the first
    /// one that fits. Returns whether a placement happened.
    async fn try_place_in_window(
        &self,
        day: &mut Day,
        candidate: &ResolvedAppointment,
        ctx: &DayContext,
        deadline: NaiveTime,
    ) -> bool {
        let appt_hours = self.config.appointment_hours;

        for window in open_windows(day, ctx, self.config.work_start, deadline) {
            let travel_in_est = estimate_hours(&window.from_point, &candidate.point);
            let travel_out_est = estimate_hours(&candidate.point, &window.to_point);
            let width = hours_between(window.start, window.end);
            if width < travel_in_est + appt_hours + travel_out_est {
                continue;
            }

            // The window looks wide enough; now use real legs.
            let leg_in = self.oracle.leg(window.from_point, candidate.point).await;
            let start = snap_up(add_hours(window.start, leg_in.duration_hours));
            let end = add_hours(start, appt_hours);
            if add_hours(end, travel_out_est) > window.end {
                continue;
            }

            let visit = Segment {
                start,
                end,
                kind: SegmentKind::Appointment(PlannedVisit::from_resolved(candidate)),
            };
            if day.insert_segment(visit).is_err() {
                // Collision with something the window math missed; this
                // window is unusable for the candidate.
                continue;
            }

            if leg_in.duration_hours > 0.0 && window.start < start {
                let travel = Segment {
                    start: window.start,
                    end: start,
                    kind: SegmentKind::Travel {
                        kind: window.inbound_kind,
                        from_label: window.from_label.clone(),
                        to_label: candidate.city.clone(),
                        distance_km: leg_in.distance_km,
                    },
                };
                if let Err(err) = day.insert_segment(travel) {
                    // Roll the appointment back out and keep looking.
                    warn!(%err, "inbound leg collided, rolling back placement");
                    day.segments.retain(|s| {
                        !(s.start == start && s.is_appointment())
                    });
                    continue;
                }
            }

            // Connect to the following fixed appointment, when there is one
            // and the leg fits the rest of the window.
            if let Some(to_point) = window.outbound_target {
                let leg_out = self.oracle.leg(candidate.point, to_point).await;
                if leg_out.duration_hours > 0.0 {
                    let arrive = snap_up(add_hours(end, leg_out.duration_hours));
                    let travel = Segment {
                        start: end,
                        end: arrive,
                        kind: SegmentKind::Travel {
                            kind: TravelKind::Travel,
                            from_label: candidate.city.clone(),
                            to_label: window.to_label.clone(),
                            distance_km: leg_out.distance_km,
                        },
                    };
                    if day.insert_segment(travel).is_err() {
                        debug!("outbound connector does not fit, leaving gap idle");
                    }
                }
            }
            return true;
        }
        false
    }

    /// Sequence mode: nearest-first placement from the day's start point.
    async fn sequence(
        &self,
        day: &mut Day,
        mut candidates: Vec<ResolvedAppointment>,
        ctx: &DayContext,
    ) -> Vec<ResolvedAppointment> {
        let appt_hours = self.config.appointment_hours;
        let mut current_point = ctx.start_point;
        let mut current_label = ctx.start_label.clone();
        let mut first = true;

        // Friday's placements must leave room for the 17:00 return.
        let budget = if ctx.is_friday {
            ctx.day_budget_hours.min(hours_between(
                self.config.work_start,
                self.config.friday_return_deadline,
            ))
        } else {
            ctx.day_budget_hours
        };

        while !candidates.is_empty() {
            let idx = nearest_index(&candidates, &current_point);
            let candidate = candidates.remove(idx);
            let leg = self.oracle.leg(current_point, candidate.point).await;
            let worked = day.total_hours();

            // When this stop would plausibly end the day with a drive home
            // (Friday always; Mon-Thu when it is inside the overnight
            // radius), that return has to fit the budget too.
            let home_estimate_km = candidate.point.haversine_km(&HOME_BASE)
                * ESTIMATE_ROAD_FACTOR;
            let return_reserve = if ctx.is_friday
                || home_estimate_km <= self.config.overnight_threshold_km
            {
                estimate_hours(&candidate.point, &HOME_BASE)
            } else {
                0.0
            };

            // The placement may trigger a statutory break; that time counts
            // against the budget too. The break requirement itself is
            // computed on work + driving only.
            let content = worked - day.break_hours();
            let projected_content = content + leg.duration_hours + appt_hours;
            let break_due = (required_break_hours(projected_content)
                - day.break_hours())
            .max(0.0);

            if worked + leg.duration_hours + appt_hours + break_due + return_reserve
                > budget
            {
                let travel_break_due = (required_break_hours(
                    content + leg.duration_hours,
                ) - day.break_hours())
                .max(0.0);
                if !ctx.is_friday
                    && worked + leg.duration_hours + travel_break_due <= budget
                {
                    // Out of working time, but the drive still fits: move
                    // toward tomorrow's first stop and sleep there.
                    self.travel_and_overnight(day, ctx, &candidate, &leg, first, &current_label);
                    self.insert_due_break(day, None);
                    candidates.insert(0, candidate);
                    return candidates;
                }
                candidates.insert(0, candidate);
                return candidates;
            }

            let depart = day.last_end().unwrap_or(self.config.work_start);
            let depart = depart.max(self.config.work_start);
            let (start, end) = if leg.duration_hours > 0.0 {
                let start = snap_up(add_hours(depart, leg.duration_hours));
                let kind = if first {
                    if ctx.from_hotel {
                        TravelKind::DepartureFromHotel
                    } else {
                        TravelKind::Departure
                    }
                } else {
                    TravelKind::Travel
                };
                let travel = Segment {
                    start: depart,
                    end: start,
                    kind: SegmentKind::Travel {
                        kind,
                        from_label: current_label.clone(),
                        to_label: candidate.city.clone(),
                        distance_km: leg.distance_km,
                    },
                };
                if let Err(err) = day.insert_segment(travel) {
                    warn!(%err, "unexpected collision in sequence mode");
                    candidates.insert(0, candidate);
                    return candidates;
                }
                (start, add_hours(start, appt_hours))
            } else {
                (depart, add_hours(depart, appt_hours))
            };

            let visit = Segment {
                start,
                end,
                kind: SegmentKind::Appointment(PlannedVisit::from_resolved(&candidate)),
            };
            if let Err(err) = day.insert_segment(visit) {
                warn!(%err, "unexpected collision in sequence mode");
                candidates.insert(0, candidate);
                return candidates;
            }

            current_point = candidate.point;
            current_label = candidate.city.clone();
            first = false;

            self.insert_due_break(day, None);
        }
        Vec::new()
    }

    /// The "work limit reached" branch: perform the leg, then check into a
    /// hotel at the destination.
    fn travel_and_overnight(
        &self,
        day: &mut Day,
        ctx: &DayContext,
        candidate: &ResolvedAppointment,
        leg: &crate::distance::Leg,
        first: bool,
        current_label: &str,
    ) {
        let depart = day
            .last_end()
            .unwrap_or(self.config.work_start)
            .max(self.config.work_start);
        let arrive = snap_up(add_hours(depart, leg.duration_hours));
        let kind = if first {
            if ctx.from_hotel {
                TravelKind::DepartureFromHotel
            } else {
                TravelKind::Departure
            }
        } else {
            TravelKind::Travel
        };
        let travel = Segment {
            start: depart,
            end: arrive,
            kind: SegmentKind::Travel {
                kind,
                from_label: current_label.to_owned(),
                to_label: candidate.city.clone(),
                distance_km: leg.distance_km,
            },
        };
        if let Err(err) = day.insert_segment(travel) {
            warn!(%err, "could not place pre-overnight leg");
            return;
        }
        day.overnight = Some(Overnight {
            city: candidate.city.clone(),
            point: candidate.point,
            reason: "Arbeitszeitlimit erreicht".to_owned(),
            check_in: snap_nearest(add_hours(arrive, 0.5)),
            hotel_label: format!("Hotel in {}", candidate.city),
        });
        debug!(city = %candidate.city, "overnight after work-limit travel");
    }

    /// Recompute the legally required break and insert the missing part
    /// right after the last appointment, shortened to whatever open room is
    /// there (never overlapping, possibly refused).
    fn insert_due_break(&self, day: &mut Day, limit: Option<NaiveTime>) {
        let content = day.total_hours() - day.break_hours();
        let required = required_break_hours(content);
        let mut missing = required - day.break_hours();
        if missing <= 0.0 {
            return;
        }

        let Some(last_visit_end) = day
            .segments
            .iter()
            .rev()
            .find(|s| s.is_appointment())
            .map(|s| s.end)
        else {
            return;
        };

        // Skip past anything already scheduled right after the appointment.
        let mut gap_start = last_visit_end;
        loop {
            let covering = day
                .segments
                .iter()
                .find(|s| s.start <= gap_start && s.end > gap_start)
                .map(|s| s.end);
            match covering {
                Some(end) => gap_start = end,
                None => break,
            }
        }
        let gap_end = day
            .segments
            .iter()
            .map(|s| s.start)
            .filter(|start| *start >= gap_start)
            .min()
            .into_iter()
            .chain(limit)
            .min();
        if let Some(gap_end) = gap_end {
            let room = hours_between(gap_start, gap_end);
            if room < 0.5 {
                warn!("no room for required break, refusing insertion");
                return;
            }
            missing = missing.min((room * 2.0).floor() / 2.0);
        }

        let segment = Segment {
            start: gap_start,
            end: add_hours(gap_start, missing),
            kind: SegmentKind::Break,
        };
        if let Err(err) = day.insert_segment(segment) {
            warn!(%err, "break insertion collided, refusing");
        }
    }

    /// Close out the day: make sure the morning leg exists, then either a
    /// return home or a hotel overnight (never a Friday overnight).
    async fn close_day(&self, day: &mut Day, ctx: &DayContext, notes: &mut Vec<String>) {
        if day.overnight.is_some() {
            return;
        }
        if !day.has_appointments() {
            // A hotel start still has to get the driver home, even when the
            // day has no work left.
            if ctx.from_hotel && day.segments.is_empty() {
                self.emit_return(day, ctx.start_point, &ctx.start_label, self.config.work_start)
                    .await;
            }
            return;
        }

        self.ensure_departure_leg(day, ctx).await;

        if ctx.is_friday {
            self.close_friday(day, ctx, notes).await;
        } else {
            self.close_weekday(day).await;
        }
    }

    /// A day whose first segment is a bare appointment (fixed-first
    /// placement) still needs its morning drive.
    async fn ensure_departure_leg(&self, day: &mut Day, ctx: &DayContext) {
        let Some(first) = day.segments.first() else {
            return;
        };
        if !first.is_appointment() {
            return;
        }
        let (first_start, first_point, first_city) = match &first.kind {
            SegmentKind::Appointment(visit) => {
                (first.start, visit.point, visit.city.clone())
            }
            _ => unreachable!("checked above"),
        };

        let leg = self.oracle.leg(ctx.start_point, first_point).await;
        if leg.duration_hours <= 0.0 {
            return;
        }
        let depart = snap_down(add_hours(first_start, -leg.duration_hours));
        let kind = if ctx.from_hotel {
            TravelKind::DepartureFromHotel
        } else {
            TravelKind::Departure
        };
        let travel = Segment {
            start: depart,
            end: first_start,
            kind: SegmentKind::Travel {
                kind,
                from_label: ctx.start_label.clone(),
                to_label: first_city,
                distance_km: leg.distance_km,
            },
        };
        if let Err(err) = day.insert_segment(travel) {
            warn!(%err, "could not place morning departure leg");
        }
    }

    async fn close_friday(&self, day: &mut Day, ctx: &DayContext, notes: &mut Vec<String>) {
        let deadline = self.config.friday_return_deadline;

        loop {
            let Some(last_visit) = day.last_visit().cloned() else {
                // Every appointment was dropped; clean the day and drive
                // home directly when the morning started at a hotel.
                day.segments.clear();
                if ctx.from_hotel {
                    self.emit_return(
                        day,
                        ctx.start_point,
                        &ctx.start_label,
                        self.config.work_start,
                    )
                    .await;
                }
                return;
            };

            let leg = self.oracle.leg(last_visit.point, HOME_BASE).await;
            let last_end = day.last_end().expect("day has segments");
            let arrival = snap_up(add_hours(last_end, leg.duration_hours));

            if arrival <= deadline {
                self.push_return(day, &last_visit.city, leg.distance_km, last_end, arrival);
                return;
            }

            if last_visit.fixed {
                // A fixed booking pins the day; report the violation instead
                // of silently rescheduling.
                self.push_return(day, &last_visit.city, leg.distance_km, last_end, arrival);
                notes.push(format!(
                    "Freitag: Fixtermin {} erzwingt Rückkehr erst {} (nach {})",
                    last_visit.id,
                    hhmm(arrival),
                    hhmm(deadline),
                ));
                return;
            }

            debug!(id = %last_visit.id, "dropping trailing visit for Friday deadline");
            pop_trailing_visit(day);
        }
    }

    async fn close_weekday(&self, day: &mut Day) {
        let Some(last_visit) = day.last_visit().cloned() else {
            return;
        };
        let leg = self.oracle.leg(last_visit.point, HOME_BASE).await;
        let last_end = day.last_end().expect("day has segments");
        let arrival_raw = add_hours(last_end, leg.duration_hours);
        let day_limit = add_hours(self.config.work_start, self.config.max_day_hours);

        let too_far = leg.distance_km > self.config.overnight_threshold_km;
        let too_late = arrival_raw > day_limit;
        if too_far || too_late {
            let reason = if too_far {
                format!("{:.0} km bis Hannover", leg.distance_km)
            } else {
                format!("Rückkehr erst {}", hhmm(snap_up(arrival_raw)))
            };
            let last_visit_end = day
                .segments
                .iter()
                .rev()
                .find(|s| s.is_appointment())
                .map(|s| s.end)
                .expect("day has appointments");
            day.overnight = Some(Overnight {
                city: last_visit.city.clone(),
                point: last_visit.point,
                reason,
                check_in: snap_nearest(add_hours(last_visit_end, 0.5)),
                hotel_label: format!("Hotel in {}", last_visit.city),
            });
            return;
        }

        self.push_return(
            day,
            &last_visit.city,
            leg.distance_km,
            last_end,
            snap_up(arrival_raw),
        );
    }

    fn push_return(
        &self,
        day: &mut Day,
        from_label: &str,
        distance_km: f64,
        depart: NaiveTime,
        arrive: NaiveTime,
    ) {
        if arrive <= depart {
            return;
        }
        let segment = Segment {
            start: depart,
            end: arrive,
            kind: SegmentKind::Travel {
                kind: TravelKind::Return,
                from_label: from_label.to_owned(),
                to_label: "Hannover".to_owned(),
                distance_km,
            },
        };
        if let Err(err) = day.insert_segment(segment) {
            warn!(%err, "could not place return leg");
        }
    }

    async fn emit_return(
        &self,
        day: &mut Day,
        from_point: GeoPoint,
        from_label: &str,
        depart: NaiveTime,
    ) {
        let leg = self.oracle.leg(from_point, HOME_BASE).await;
        if leg.duration_hours <= 0.0 {
            return;
        }
        let arrive = snap_up(add_hours(depart, leg.duration_hours));
        self.push_return(day, from_label, leg.distance_km, depart, arrive);
    }

    fn day_deadline(&self, ctx: &DayContext) -> NaiveTime {
        let budget_end = add_hours(self.config.work_start, ctx.day_budget_hours);
        if ctx.is_friday {
            budget_end.min(self.config.friday_return_deadline)
        } else {
            budget_end
        }
    }
}

/// Statutory break requirement for `content_hours` of work plus driving
/// (breaks themselves excluded).
fn required_break_hours(content_hours: f64) -> f64 {
    if content_hours > 9.0 {
        1.0
    } else if content_hours > 6.0 {
        0.5
    } else {
        0.0
    }
}

/// Feasibility guess for a leg, at 80 km/h plus the standard pad.
fn estimate_hours(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let gc = from.haversine_km(to);
    if gc == 0.0 {
        return 0.0;
    }
    gc * ESTIMATE_ROAD_FACTOR / ESTIMATE_SPEED_KMH + TRAVEL_PAD_HOURS
}

fn nearest_index(candidates: &[ResolvedAppointment], from: &GeoPoint) -> usize {
    let mut best = 0;
    let mut best_km = f64::INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let km = from.haversine_km(&candidate.point);
        if km < best_km {
            best = i;
            best_km = km;
        }
    }
    best
}

/// An open scheduling window with its location context.
struct Window {
    start: NaiveTime,
    end: NaiveTime,
    from_point: GeoPoint,
    from_label: String,
    /// Appointment following the window, when any (the trailing window
    /// targets home for feasibility but gets no connector leg here).
    outbound_target: Option<GeoPoint>,
    to_point: GeoPoint,
    to_label: String,
    inbound_kind: TravelKind,
}

/// Open windows between the day's existing segments, leading and trailing
/// included, in chronological order.
fn open_windows(
    day: &Day,
    ctx: &DayContext,
    work_start: NaiveTime,
    deadline: NaiveTime,
) -> Vec<Window> {
    let mut windows = Vec::new();

    // Location context: the appointment before/after each gap.
    let visits: Vec<(NaiveTime, NaiveTime, GeoPoint, String)> = day
        .segments
        .iter()
        .filter_map(|s| match &s.kind {
            SegmentKind::Appointment(v) => {
                Some((s.start, s.end, v.point, v.city.clone()))
            }
            _ => None,
        })
        .collect();

    let mut boundaries: Vec<(NaiveTime, NaiveTime)> = Vec::new();
    let first_start = day.segments.first().map(|s| s.start);
    let last_end = day.last_end();

    // Leading window.
    if let Some(first_start) = first_start {
        boundaries.push((work_start, first_start));
    }
    // Gaps between consecutive segments.
    for pair in day.segments.windows(2) {
        if pair[0].end < pair[1].start {
            boundaries.push((pair[0].end, pair[1].start));
        }
    }
    // Trailing window.
    if let Some(last_end) = last_end {
        if last_end < deadline {
            boundaries.push((last_end, deadline));
        }
    }

    for (start, end) in boundaries {
        if start >= end {
            continue;
        }
        // Who do we come from at `start`?
        let before = visits.iter().rev().find(|(_, visit_end, _, _)| *visit_end <= start);
        let (from_point, from_label, inbound_kind) = match before {
            Some((_, _, point, city)) => {
                (*point, city.clone(), TravelKind::Travel)
            }
            None => (
                ctx.start_point,
                ctx.start_label.clone(),
                if ctx.from_hotel {
                    TravelKind::DepartureFromHotel
                } else {
                    TravelKind::Departure
                },
            ),
        };
        // Who do we go to after `end`?
        let after = visits.iter().find(|(visit_start, _, _, _)| *visit_start >= end);
        let (outbound_target, to_point, to_label) = match after {
            Some((_, _, point, city)) => (Some(*point), *point, city.clone()),
            None => (None, HOME_BASE, "Hannover".to_owned()),
        };

        windows.push(Window {
            start,
            end,
            from_point,
            from_label,
            outbound_target,
            to_point,
            to_label,
            inbound_kind,
        });
    }
    windows
}

/// Remove the last appointment plus its inbound leg and any trailing breaks
/// or connectors after it.
fn pop_trailing_visit(day: &mut Day) {
    let Some(visit_idx) = day
        .segments
        .iter()
        .rposition(|s| s.is_appointment())
    else {
        return;
    };
    // Everything after the appointment (breaks, stray connectors) goes too.
    day.segments.truncate(visit_idx + 1);
    day.segments.pop();
    // And the travel leg that brought us here, when it is now dangling.
    if day
        .segments
        .last()
        .map(|s| s.is_travel())
        .unwrap_or(false)
    {
        day.segments.pop();
    }
}
