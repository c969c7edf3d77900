//! Day-route planning over assigned verification tasks.
//!
//! Ordering is priority buckets first (High before Medium before Low),
//! then a greedy nearest-unvisited walk within each bucket. This is a
//! heuristic: it approximates minimal travel cost cheaply and makes no
//! shortest-tour claim. Planning is stateless and side-effect-free;
//! callers recompute whenever a task completes or context changes.

use serde::{Deserialize, Serialize};

use crate::config::RouteConfig;
use crate::core::{GeoPoint, VerificationTask, haversine_km};

mod authority;

pub use authority::{AuthorityError, TaskAuthority, TaskCache, TaskCacheError};

/// Working-day constraints for a route.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RouteConstraints {
    /// Total budget covering travel and on-site time.
    pub working_minutes: u32,
    /// Average field speed used to turn distance into travel time.
    pub travel_speed_kmh: f64,
}

impl RouteConstraints {
    pub fn from_config(config: &RouteConfig) -> Self {
        Self {
            working_minutes: config.working_minutes,
            travel_speed_kmh: config.travel_speed_kmh,
        }
    }

    fn travel_minutes(&self, distance_km: f64) -> u32 {
        if self.travel_speed_kmh <= 0.0 {
            return 0;
        }
        (distance_km / self.travel_speed_kmh * 60.0).ceil() as u32
    }
}

impl Default for RouteConstraints {
    fn default() -> Self {
        Self::from_config(&RouteConfig::default())
    }
}

/// One planned visit with its cost breakdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteLeg {
    pub task: VerificationTask,
    pub distance_km: f64,
    pub travel_minutes: u32,
    pub visit_minutes: u32,
    /// Minutes of budget spent once this visit completes.
    pub cumulative_minutes: u32,
}

/// A planned day: ordered visits plus everything that did not fit.
///
/// `visits` and `deferred` partition the input task set - no task is
/// ever dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoutePlan {
    pub visits: Vec<RouteLeg>,
    pub deferred: Vec<VerificationTask>,
}

impl RoutePlan {
    pub fn total_minutes(&self) -> u32 {
        self.visits.last().map(|leg| leg.cumulative_minutes).unwrap_or(0)
    }
}

/// Plan the day's route from `start`.
///
/// Deterministic for identical inputs: candidate selection tie-breaks on
/// (distance, task id) and never relies on unordered iteration, so
/// recomputing after a completion does not reshuffle unrelated tasks.
/// Inclusion stops at the first task that would overrun the budget; that
/// task and every remaining one land in `deferred`.
pub fn plan_route(
    tasks: &[VerificationTask],
    start: GeoPoint,
    constraints: &RouteConstraints,
) -> RoutePlan {
    // Last-issued-wins when the authority reassigned a task id.
    let mut latest: Vec<VerificationTask> = Vec::new();
    for task in tasks {
        match latest.iter_mut().find(|t| t.task_id == task.task_id) {
            Some(existing) => {
                *existing = VerificationTask::newer_of(existing.clone(), task.clone());
            }
            None => latest.push(task.clone()),
        }
    }

    // Priority buckets, stably ordered by task id so the greedy walk has
    // a deterministic candidate order.
    latest.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let mut plan = RoutePlan::default();
    let mut position = start;
    let mut spent_minutes = 0u32;
    let mut over_budget = false;

    let mut bucket_start = 0;
    while bucket_start < latest.len() {
        let priority = latest[bucket_start].priority;
        let bucket_end = latest[bucket_start..]
            .iter()
            .position(|t| t.priority != priority)
            .map(|i| bucket_start + i)
            .unwrap_or(latest.len());
        let mut remaining: Vec<VerificationTask> =
            latest[bucket_start..bucket_end].to_vec();

        while !remaining.is_empty() {
            if over_budget {
                plan.deferred.append(&mut remaining);
                break;
            }

            let nearest = nearest_index(&remaining, position);
            let task = remaining.remove(nearest);
            let distance_km = haversine_km(position, task.location);
            let travel_minutes = constraints.travel_minutes(distance_km);
            let visit_minutes = task.estimated_duration_minutes;
            let needed = spent_minutes
                .saturating_add(travel_minutes)
                .saturating_add(visit_minutes);

            if needed > constraints.working_minutes {
                plan.deferred.push(task);
                plan.deferred.append(&mut remaining);
                over_budget = true;
                break;
            }

            spent_minutes = needed;
            position = task.location;
            plan.visits.push(RouteLeg {
                task,
                distance_km,
                travel_minutes,
                visit_minutes,
                cumulative_minutes: spent_minutes,
            });
        }

        bucket_start = bucket_end;
    }

    tracing::debug!(
        visits = plan.visits.len(),
        deferred = plan.deferred.len(),
        total_minutes = plan.total_minutes(),
        "route planned"
    );
    plan
}

fn nearest_index(candidates: &[VerificationTask], from: GeoPoint) -> usize {
    let mut best = 0;
    let mut best_distance = haversine_km(from, candidates[0].location);
    for (index, task) in candidates.iter().enumerate().skip(1) {
        let distance = haversine_km(from, task.location);
        // Candidates arrive sorted by task id, so strict-less keeps the
        // smaller id on ties.
        if distance.total_cmp(&best_distance).is_lt() {
            best = index;
            best_distance = distance;
        }
    }
    best
}
