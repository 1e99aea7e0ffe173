//! Demo Mode - Simulated tracking provider for testing
//!
//! Produces provider-shaped payloads for a small collection fleet without a
//! real tracking account. Records deliberately mix field spellings, nesting
//! and timestamp encodings the way real providers do, and now and then a
//! record arrives without a position.

use std::f64::consts::TAU;
use std::future::{ready, Future};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::geo::Position;
use crate::source::{FeedError, TelemetrySource};
use crate::track::HistoryRange;

/// Depot the simulated fleet operates around
const DEPOT: Position = Position {
    lat: 12.9716,
    lng: 77.5946,
};

/// Spacing between synthetic history samples
const HISTORY_STEP_MS: i64 = 30_000;

/// Upper bound on synthetic history length
const MAX_HISTORY_POINTS: i64 = 2_000;

/// Chance that a live record is emitted without coordinates
const MALFORMED_RATE: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Duty {
    /// Driving its collection route
    Route,
    /// Stopped at a pickup point, engine running
    Pickup,
    /// Back at the depot, engine off
    Parked,
    /// Tracker unit not reporting
    Offline,
}

#[derive(Debug, Clone)]
struct DemoVehicle {
    reg_no: String,
    position: Position,
    heading: f64,
    speed_kmph: f64,
    duty: Duty,
    odometer_km: f64,
}

struct DemoState {
    vehicles: Vec<DemoVehicle>,
    rng: StdRng,
    tick: u64,
}

/// Simulated tracking provider
pub struct DemoFleet {
    state: Mutex<DemoState>,
    seed: u64,
}

impl DemoFleet {
    /// Create a fleet of `size` vehicles from a fixed seed
    pub fn new(size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let vehicles = (0..size)
            .map(|i| {
                let duty = match i % 7 {
                    5 => Duty::Parked,
                    6 => Duty::Offline,
                    _ => Duty::Route,
                };
                DemoVehicle {
                    reg_no: format!("KA-01-WM-{:04}", 1001 + i),
                    position: Position::new(
                        DEPOT.lat + rng.gen_range(-0.05..0.05),
                        DEPOT.lng + rng.gen_range(-0.05..0.05),
                    ),
                    heading: rng.gen_range(0.0..TAU),
                    speed_kmph: 0.0,
                    duty,
                    odometer_km: rng.gen_range(1_000.0..90_000.0),
                }
            })
            .collect();

        Self {
            state: Mutex::new(DemoState {
                vehicles,
                rng,
                tick: 0,
            }),
            seed,
        }
    }

    /// Registration numbers of the simulated vehicles
    pub fn vehicle_ids(&self) -> Vec<String> {
        self.lock().vehicles.iter().map(|v| v.reg_no.clone()).collect()
    }

    /// Advance the simulation one poll and render it as a provider payload
    pub fn next_payload(&self) -> Value {
        let mut state = self.lock();
        state.tick += 1;

        let DemoState { vehicles, rng, tick } = &mut *state;
        let records: Vec<Value> = vehicles
            .iter_mut()
            .enumerate()
            .map(|(i, vehicle)| {
                step(vehicle, rng);
                render_live(i, vehicle, *tick, rng)
            })
            .collect();

        json!({ "data": records })
    }

    /// Synthesize a history payload for one vehicle
    ///
    /// The same vehicle and range always produce the same track.
    pub fn history_payload(&self, vehicle_id: &str, range: HistoryRange) -> Value {
        let seed = vehicle_id
            .bytes()
            .fold(self.seed, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut rng = StdRng::seed_from_u64(seed);

        let count = (range.span_ms() / HISTORY_STEP_MS + 1).min(MAX_HISTORY_POINTS);
        let mut vehicle = DemoVehicle {
            reg_no: vehicle_id.to_string(),
            position: DEPOT,
            heading: rng.gen_range(0.0..TAU),
            speed_kmph: 0.0,
            duty: Duty::Route,
            odometer_km: 0.0,
        };

        let points: Vec<Value> = (0..count)
            .map(|n| {
                step(&mut vehicle, &mut rng);
                let at_ms = range.from_ms + n * HISTORY_STEP_MS;
                // alternate epoch encodings the way mixed tracker units do
                let timestamp = if n % 2 == 0 {
                    json!(at_ms)
                } else {
                    json!((at_ms / 1000).to_string())
                };
                json!({
                    "latitude": vehicle.position.lat,
                    "longitude": vehicle.position.lng,
                    "speed": round1(vehicle.speed_kmph),
                    "address": format!("Ward {} collection route", 1 + n % 12),
                    "gpsTime": timestamp,
                })
            })
            .collect();

        json!({ "vehicleLocations": points })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TelemetrySource for DemoFleet {
    fn fetch_live(&self) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        ready(Ok(self.next_payload()))
    }

    fn fetch_history(
        &self,
        vehicle_id: &str,
        range: HistoryRange,
    ) -> impl Future<Output = Result<Value, FeedError>> + Send + 'static {
        ready(Ok(self.history_payload(vehicle_id, range)))
    }
}

fn step(vehicle: &mut DemoVehicle, rng: &mut StdRng) {
    if vehicle.duty == Duty::Route && rng.gen_bool(0.15) {
        vehicle.duty = Duty::Pickup;
    } else if vehicle.duty == Duty::Pickup && rng.gen_bool(0.5) {
        vehicle.duty = Duty::Route;
    }

    vehicle.speed_kmph = match vehicle.duty {
        Duty::Route => (vehicle.speed_kmph + rng.gen_range(-5.0..8.0)).clamp(8.0, 45.0),
        Duty::Pickup | Duty::Parked | Duty::Offline => 0.0,
    };

    if vehicle.speed_kmph > 0.0 {
        vehicle.heading = (vehicle.heading + rng.gen_range(-0.4..0.4)).rem_euclid(TAU);
        // ~111 km per degree; one poll is roughly 15 s of driving
        let km = vehicle.speed_kmph * 15.0 / 3600.0;
        vehicle.position.lat += km / 111.0 * vehicle.heading.cos();
        vehicle.position.lng += km / 111.0 * vehicle.heading.sin();
        vehicle.odometer_km += km;
    }
}

fn render_live(index: usize, vehicle: &DemoVehicle, tick: u64, rng: &mut StdRng) -> Value {
    let ignition = match vehicle.duty {
        Duty::Route | Duty::Pickup => "ON",
        Duty::Parked | Duty::Offline => "OFF",
    };
    let status = match vehicle.duty {
        Duty::Route => "Running",
        Duty::Pickup => "Idle",
        Duty::Parked => "Parked",
        Duty::Offline => "No Data",
    };
    let speed = round1(vehicle.speed_kmph);
    let odometer = round1(vehicle.odometer_km);

    if rng.gen_bool(MALFORMED_RATE) {
        return json!({ "vehicleId": vehicle.reg_no, "status": status });
    }

    match index % 3 {
        0 => json!({
            "vehicleId": vehicle.reg_no,
            "name": format!("Compactor {}", index + 1),
            "lat": vehicle.position.lat,
            "lng": vehicle.position.lng,
            "speed": speed,
            "ignition": ignition,
            "status": status,
            "distance": odometer,
            "updatedAt": format!("tick {tick}"),
        }),
        1 => json!({
            "vehicle_number": vehicle.reg_no,
            "vehicleName": format!("Tipper {}", index + 1),
            "latitude": vehicle.position.lat.to_string(),
            "longitude": vehicle.position.lng.to_string(),
            "speedKmph": speed.to_string(),
            "ign": if ignition == "ON" { 1 } else { 0 },
            "vehicleStatus": status.to_uppercase(),
            "odometer": odometer,
        }),
        _ => json!({
            "regNo": vehicle.reg_no,
            "gps": {
                "lat": vehicle.position.lat,
                "lng": vehicle.position.lng,
            },
            "gpsSpeed": speed,
            "ignitionStatus": ignition.to_lowercase(),
            "noData": vehicle.duty == Duty::Offline,
        }),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
