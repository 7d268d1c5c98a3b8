//! End-to-end planning scenarios against the offline tiers and a scripted
//! distance provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};

use tourenplan::appointments::Appointment;
use tourenplan::cache_stores::memory::MemoryCacheStore;
use tourenplan::distance::DistanceOracle;
use tourenplan::geo::GeoPoint;
use tourenplan::geocoders::Geocoder;
use tourenplan::planner::{PlanningConfig, WeekPlanner};
use tourenplan::provider::{
    DistanceMatrix, GeoProvider, MatrixElement, ProviderError, ProviderGeocode,
    TrafficModel, TravelMode,
};
use tourenplan::report::{DayReport, WeekReport};

/// Distance-matrix-only provider: highway speeds, never geocodes.
struct MatrixProvider;

#[async_trait]
impl GeoProvider for MatrixProvider {
    fn tag(&self) -> &str {
        "matrix-mock"
    }

    async fn geocode(
        &self,
        _address: &str,
        _region_hint: &str,
        _language_hint: &str,
    ) -> Result<ProviderGeocode, ProviderError> {
        Err(ProviderError::InvalidRequest("geocoding unsupported".into()))
    }

    async fn distance_matrix(
        &self,
        origins: &[GeoPoint],
        destinations: &[GeoPoint],
        _mode: TravelMode,
        _traffic: TrafficModel,
    ) -> Result<DistanceMatrix, ProviderError> {
        let elements = origins
            .iter()
            .map(|origin| {
                destinations
                    .iter()
                    .map(|dest| {
                        let km = origin.haversine_km(dest) * 1.25;
                        Some(MatrixElement {
                            km,
                            seconds: km / 110.0 * 3600.0,
                            seconds_in_traffic: None,
                        })
                    })
                    .collect()
            })
            .collect();
        Ok(DistanceMatrix { elements })
    }
}

fn offline_planner() -> WeekPlanner {
    let store = Arc::new(MemoryCacheStore::new());
    let geocoder = Arc::new(Geocoder::new(store.clone(), None));
    let oracle = Arc::new(DistanceOracle::new(store, None));
    WeekPlanner::new(PlanningConfig::strict_40h_10h(), geocoder, oracle)
}

fn matrix_planner() -> WeekPlanner {
    let store = Arc::new(MemoryCacheStore::new());
    let geocoder = Arc::new(Geocoder::new(store.clone(), None));
    let oracle = Arc::new(DistanceOracle::new(store, Some(Arc::new(MatrixProvider))));
    WeekPlanner::new(PlanningConfig::strict_40h_10h(), geocoder, oracle)
}

fn appointment(value: serde_json::Value) -> Appointment {
    serde_json::from_value(value).expect("valid appointment JSON")
}

fn monday(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Parse `"08:30 - 11:30"` back into times.
fn segment_times(day: &DayReport) -> Vec<(NaiveTime, NaiveTime)> {
    day.segments
        .iter()
        .map(|s| {
            let (start, end) = s.time.split_once(" - ").expect("time range");
            (
                NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
                NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
            )
        })
        .collect()
}

fn assert_week_invariants(report: &WeekReport) {
    // Five days, Monday onward.
    assert_eq!(report.days.len(), 5);
    for (i, day) in report.days.iter().enumerate() {
        assert_eq!(
            day.date,
            report.week_start + chrono::Duration::days(i as i64)
        );
    }

    // Daily and weekly limits hold.
    let total: f64 = report.days.iter().map(|d| d.total_hours).sum();
    assert!(total <= 40.0 + 1e-9, "week total {} exceeds 40h", total);
    for day in &report.days {
        assert!(
            day.total_hours <= 10.0 + 1e-9,
            "{} total {} exceeds 10h",
            day.day_name,
            day.total_hours
        );
    }

    for day in &report.days {
        let times = segment_times(day);
        // No overlapping segments.
        for (i, a) in times.iter().enumerate() {
            for b in &times[i + 1..] {
                assert!(
                    a.1 <= b.0 || b.1 <= a.0,
                    "{}: segments {:?} and {:?} overlap",
                    day.day_name,
                    a,
                    b
                );
            }
        }
        // Everything on the half-hour grid.
        for (start, end) in &times {
            for t in [start, end] {
                let minutes = chrono::Timelike::num_seconds_from_midnight(t) / 60;
                assert_eq!(minutes % 30, 0, "{}: {} off the grid", day.day_name, t);
            }
        }
        // No overnight and appointments placed means the day drives home.
        let has_appointments = day.segments.iter().any(|s| s.kind == "appointment");
        if day.overnight.is_none() && has_appointments {
            assert_eq!(
                day.segments.last().map(|s| s.kind.as_str()),
                Some("return"),
                "{} should end with a return leg",
                day.day_name
            );
        }
    }

    // A day after an overnight starts out from the hotel's city,
    // whether it works on (departure_from_hotel) or just drives home.
    for i in 0..4 {
        if let Some(overnight) = &report.days[i].overnight {
            let next = &report.days[i + 1];
            if let Some(first_travel) =
                next.segments.iter().find(|s| s.kind != "appointment")
            {
                assert!(
                    first_travel.label.contains(&overnight.city),
                    "{} should start from {}",
                    next.day_name,
                    overnight.city
                );
            }
        }
    }
}

#[tokio::test]
async fn empty_pool_gives_five_empty_days() {
    let report = offline_planner()
        .plan(&[], monday(2025, 6, 2))
        .await
        .unwrap();

    assert_week_invariants(&report);
    assert_eq!(report.total_hours, 0.0);
    assert_eq!(report.stats.total_appointments, 0);
    assert_eq!(report.stats.work_days, 0);
    for day in &report.days {
        assert!(day.segments.is_empty());
        assert!(day.overnight.is_none());
    }
}

#[tokio::test]
async fn fixed_munich_appointment_lands_on_tuesday_with_overnight() {
    let pool = vec![appointment(serde_json::json!({
        "id": "A",
        "customer": "BMW Welt",
        "address": "Petuelring 130, 80809 München",
        "status": "bestätigt",
        "isFixed": true,
        "fixedDate": "2025-06-10",
        "fixedTime": "14:00"
    }))];

    let report = offline_planner()
        .plan(&pool, monday(2025, 6, 9))
        .await
        .unwrap();
    assert_week_invariants(&report);

    let tuesday = &report.days[1];
    assert_eq!(tuesday.day_name, "Dienstag");
    assert_eq!(tuesday.date, NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());

    let visit = tuesday
        .segments
        .iter()
        .find(|s| s.kind == "appointment")
        .expect("appointment placed");
    assert_eq!(visit.time, "14:00 - 17:00");

    // The morning drive down is on the plan.
    assert_eq!(tuesday.segments[0].kind, "departure");
    assert!(tuesday.segments[0].label.contains("Hannover"));

    // Munich is far past the overnight radius.
    let overnight = tuesday.overnight.as_ref().expect("overnight in Munich");
    assert_eq!(overnight.city, "München");
    assert!(overnight.reason.contains("km bis Hannover"));
    assert_eq!(overnight.check_in, "17:30");

    // The rest of the week gets the driver home again.
    let wednesday = &report.days[2];
    assert_eq!(
        wednesday.segments.last().map(|s| s.kind.as_str()),
        Some("return")
    );
}

#[tokio::test]
async fn two_munich_appointments_nearest_first_then_overnight() {
    // Explicit coordinates: `a-near` is closer to Hannover.
    let pool = vec![
        appointment(serde_json::json!({
            "id": "b-far",
            "customer": "Kunde Süd",
            "address": "Implerstraße 9, 81371 München",
            "status": "bestätigt",
            "lat": 48.10,
            "lng": 11.60,
        })),
        appointment(serde_json::json!({
            "id": "a-near",
            "customer": "Kunde Nord",
            "address": "Leopoldstraße 50, 80802 München",
            "status": "bestätigt",
            "lat": 48.20,
            "lng": 11.50,
        })),
    ];

    let report = matrix_planner()
        .plan(&pool, monday(2025, 6, 2))
        .await
        .unwrap();
    assert_week_invariants(&report);

    // Monday: drive from Hannover, serve the nearer customer first.
    let mon = &report.days[0];
    assert_eq!(mon.segments[0].kind, "departure");
    assert!(mon.segments[0].label.starts_with("Abfahrt: Hannover"));
    let first_visit = mon
        .segments
        .iter()
        .find(|s| s.kind == "appointment")
        .expect("Monday appointment");
    assert!(first_visit.label.contains("Kunde Nord"));

    // A long driving day needs its break.
    assert!(mon.segments.iter().any(|s| s.kind == "break"));

    // The day ends in a Munich hotel, and the remaining appointment
    // follows on Tuesday from there.
    let overnight = mon.overnight.as_ref().expect("Monday overnight");
    assert_eq!(overnight.city, "München");

    let tue = &report.days[1];
    let second_visit = tue
        .segments
        .iter()
        .find(|s| s.kind == "appointment")
        .expect("Tuesday appointment");
    assert!(second_visit.label.contains("Kunde Süd"));

    assert_eq!(report.stats.total_appointments, 2);
    assert!(report.stats.overnight_stays >= 1);
}

#[tokio::test]
async fn oversized_pool_respects_week_budget() {
    // Twelve candidates around Hamburg; far more than 40 hours of work.
    let pool: Vec<Appointment> = (0..12)
        .map(|i| {
            appointment(serde_json::json!({
                "id": format!("HH-{}", i),
                "customer": format!("Kunde {}", i),
                "address": "Hamburg",
                "status": if i % 2 == 0 { "bestätigt" } else { "vorschlag" },
                "pipelineDays": i,
                "lat": 53.50 + (i as f64) * 0.01,
                "lng": 9.90 + (i as f64) * 0.012,
            }))
        })
        .collect();

    let report = offline_planner()
        .plan(&pool, monday(2025, 6, 2))
        .await
        .unwrap();
    assert_week_invariants(&report);

    // Not everything fits, and that is not an error.
    assert!(report.stats.total_appointments < 12);
    assert!(report.stats.total_appointments > 0);
    let total: f64 = report.days.iter().map(|d| d.total_hours).sum();
    assert!(total <= 40.0 + 1e-9);

    // The leftovers surface as a planning note, nothing more.
    assert!(report
        .optimizations
        .iter()
        .any(|note| note.contains("nicht eingeplant")));
}

#[tokio::test]
async fn fixed_friday_appointment_reports_late_return() {
    let pool = vec![appointment(serde_json::json!({
        "id": "FR",
        "customer": "BMW Welt",
        "address": "Petuelring 130, 80809 München",
        "status": "bestätigt",
        "isFixed": true,
        "fixedDate": "2025-06-06",
        "fixedTime": "14:30"
    }))];

    let report = offline_planner()
        .plan(&pool, monday(2025, 6, 2))
        .await
        .unwrap();

    // The fixed appointment is honored...
    let friday = &report.days[4];
    assert_eq!(friday.day_name, "Freitag");
    let visit = friday
        .segments
        .iter()
        .find(|s| s.kind == "appointment")
        .expect("fixed appointment placed");
    assert_eq!(visit.time, "14:30 - 17:30");

    // ...no overnight is allowed on Friday, so the planner drives home
    // late and reports the violation instead of rescheduling.
    assert!(friday.overnight.is_none());
    assert_eq!(
        friday.segments.last().map(|s| s.kind.as_str()),
        Some("return")
    );
    assert!(report
        .optimizations
        .iter()
        .any(|note| note.contains("Freitag") && note.contains("17:00")));
}

#[tokio::test]
async fn friday_flexible_work_ends_home_by_five() {
    // A light Friday-only pool close to home.
    let pool = vec![
        appointment(serde_json::json!({
            "id": "BS-1",
            "customer": "Kunde Braunschweig",
            "address": "Braunschweig",
            "status": "bestätigt",
            "lat": 52.2689,
            "lng": 10.5268,
        })),
    ];

    let report = offline_planner()
        .plan(&pool, monday(2025, 6, 2))
        .await
        .unwrap();
    assert_week_invariants(&report);

    // Near-home work is placed on Monday already; wherever the week ends,
    // Friday must close at home by 17:00.
    let friday = &report.days[4];
    if let Some((_, end)) = segment_times(friday).last() {
        assert!(*end <= NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }
    assert!(friday.overnight.is_none());
}

#[tokio::test]
async fn low_confidence_resolution_is_flagged_not_fatal() {
    // No postal code, no known city: bottoms out at the country centroid.
    let pool = vec![appointment(serde_json::json!({
        "id": "X",
        "customer": "Rätsel GmbH",
        "address": "Irgendwo im Nirgendwo",
        "status": "vorschlag",
    }))];

    let report = offline_planner()
        .plan(&pool, monday(2025, 6, 2))
        .await
        .unwrap();
    assert_week_invariants(&report);

    assert!(report
        .optimizations
        .iter()
        .any(|note| note.contains("landesweit")));
}
