//! Route planner properties: determinism, budget discipline, priority.

use std::collections::BTreeSet;

use fieldsync::core::{DocumentKind, GeoPoint, Priority, TaskId, VerificationTask};
use fieldsync::route::{RouteConstraints, plan_route};

fn task(
    id: &str,
    village: &str,
    priority: Priority,
    lat: f64,
    lon: f64,
    minutes: u32,
) -> VerificationTask {
    VerificationTask {
        task_id: TaskId::parse(id).unwrap(),
        beneficiary_ref: format!("ben-{id}"),
        village: village.into(),
        location: GeoPoint::new(lat, lon).unwrap(),
        priority,
        estimated_duration_minutes: minutes,
        required_document_kinds: BTreeSet::from([DocumentKind::parse("survey_number").unwrap()]),
        issued_at_ms: 1,
    }
}

fn constraints(minutes: u32) -> RouteConstraints {
    RouteConstraints {
        working_minutes: minutes,
        travel_speed_kmh: 30.0,
    }
}

#[test]
fn sixty_minute_budget_takes_both_high_tasks_and_defers_medium() {
    // Start at Village A; C is a short hop away, B is a different block.
    let village_a = task("vt-a", "Village-A", Priority::High, 19.0, 81.0, 30);
    let village_b = task("vt-b", "Village-B", Priority::Medium, 19.1, 81.1, 45);
    let village_c = task("vt-c", "Village-C", Priority::High, 19.0225, 81.0, 20);
    let start = village_a.location;

    let plan = plan_route(
        &[village_b.clone(), village_c, village_a],
        start,
        &constraints(60),
    );

    let visited: Vec<&str> = plan.visits.iter().map(|leg| leg.task.village.as_str()).collect();
    assert_eq!(visited, vec!["Village-A", "Village-C"]);
    assert!(plan.total_minutes() <= 60, "got {}", plan.total_minutes());

    assert_eq!(plan.deferred.len(), 1);
    assert_eq!(plan.deferred[0].village, "Village-B");
}

#[test]
fn planning_is_deterministic_run_twice() {
    let start = GeoPoint::new(19.0, 81.0).unwrap();
    let tasks: Vec<VerificationTask> = (0..12)
        .map(|i| {
            let priority = match i % 3 {
                0 => Priority::High,
                1 => Priority::Medium,
                _ => Priority::Low,
            };
            task(
                &format!("vt-{i:02}"),
                &format!("village-{i:02}"),
                priority,
                19.0 + f64::from(i % 5) * 0.07,
                81.0 + f64::from(i % 4) * 0.05,
                20 + (i % 3) * 10,
            )
        })
        .collect();

    let first = plan_route(&tasks, start, &constraints(300));
    let second = plan_route(&tasks, start, &constraints(300));

    let order = |plan: &fieldsync::route::RoutePlan| -> Vec<String> {
        plan.visits
            .iter()
            .map(|leg| leg.task.task_id.as_str().to_string())
            .collect()
    };
    assert_eq!(order(&first), order(&second));

    let deferred = |plan: &fieldsync::route::RoutePlan| -> Vec<String> {
        plan.deferred
            .iter()
            .map(|t| t.task_id.as_str().to_string())
            .collect()
    };
    assert_eq!(deferred(&first), deferred(&second));
}

#[test]
fn visits_and_deferred_partition_the_input() {
    let start = GeoPoint::new(19.0, 81.0).unwrap();
    let tasks: Vec<VerificationTask> = (0..10)
        .map(|i| {
            task(
                &format!("vt-{i}"),
                &format!("village-{i}"),
                Priority::Medium,
                19.0 + f64::from(i) * 0.2,
                81.0,
                60,
            )
        })
        .collect();

    let plan = plan_route(&tasks, start, &constraints(150));

    let mut seen: BTreeSet<String> = BTreeSet::new();
    for leg in &plan.visits {
        assert!(seen.insert(leg.task.task_id.as_str().to_string()));
    }
    for deferred in &plan.deferred {
        assert!(seen.insert(deferred.task_id.as_str().to_string()));
    }
    assert_eq!(seen.len(), tasks.len());
    assert!(plan.total_minutes() <= 150);
}

#[test]
fn budget_is_never_exceeded_even_with_tight_margins() {
    let start = GeoPoint::new(19.0, 81.0).unwrap();
    // Exactly one task fits: 30 minutes visit, zero travel.
    let tasks = vec![
        task("vt-1", "near", Priority::High, 19.0, 81.0, 30),
        task("vt-2", "near-too", Priority::High, 19.0, 81.0, 31),
    ];

    let plan = plan_route(&tasks, start, &constraints(60));
    assert_eq!(plan.visits.len(), 1);
    assert_eq!(plan.deferred.len(), 1);
    assert!(plan.total_minutes() <= 60);
}

#[test]
fn empty_task_set_plans_an_empty_day() {
    let start = GeoPoint::new(19.0, 81.0).unwrap();
    let plan = plan_route(&[], start, &RouteConstraints::default());
    assert!(plan.visits.is_empty());
    assert!(plan.deferred.is_empty());
    assert_eq!(plan.total_minutes(), 0);
}

#[test]
fn legs_carry_itinerary_metadata() {
    let start = GeoPoint::new(19.0, 81.0).unwrap();
    let tasks = vec![
        task("vt-1", "first", Priority::High, 19.0, 81.0, 30),
        task("vt-2", "second", Priority::High, 19.0225, 81.0, 20),
    ];

    let plan = plan_route(&tasks, start, &constraints(480));
    assert_eq!(plan.visits.len(), 2);

    let first = &plan.visits[0];
    assert_eq!(first.travel_minutes, 0);
    assert_eq!(first.cumulative_minutes, 30);

    let second = &plan.visits[1];
    assert!(second.distance_km > 2.0 && second.distance_km < 3.0);
    assert!(second.travel_minutes >= 5);
    assert_eq!(
        second.cumulative_minutes,
        30 + second.travel_minutes + second.visit_minutes
    );
}
