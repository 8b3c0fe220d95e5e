//! Built-in synthetic walks and the checks each one must satisfy.
use trailgrid_game::PayoutMode;

use super::harness::{WalkPlan, WalkSummary};

/// Bounds a walk summary must fall inside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expectations {
    /// Allowed relative error between walked and planned distance.
    pub distance_tolerance: Option<f64>,
    pub min_rejected: usize,
    pub min_new_cells: usize,
    pub min_converted: usize,
    pub min_rescues_resolved: usize,
    pub deep_zone: bool,
    pub settled: bool,
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub key: &'static str,
    pub name: String,
    pub description: &'static str,
    pub plan: WalkPlan,
    pub expect: Expectations,
}

const SCENARIOS: &[(&str, &str)] = &[
    ("smoke", "Short brisk walk; every fix accepted, cells discovered"),
    ("long-haul", "Two kilometres then a normal settlement"),
    ("gps-jitter", "Spikes and poor-accuracy fixes are filtered out"),
    ("overloaded", "Full bag from the start; loot converts to stamina"),
    ("deep-zone", "Past ten kilometres in one trip, eating to keep going"),
    ("rescue", "Nearly spent walker; the first find waits for a stamina rescue"),
];

pub fn list_scenarios() -> &'static [(&'static str, &'static str)] {
    SCENARIOS
}

pub fn get_scenario(key: &str) -> Option<TestScenario> {
    let key = key.to_lowercase();
    let &(key, description) = SCENARIOS.iter().find(|(k, _)| *k == key)?;
    let (name, plan, expect) = match key {
        "smoke" => (
            "Smoke",
            WalkPlan::default(),
            Expectations {
                distance_tolerance: Some(0.02),
                min_new_cells: 5,
                ..Expectations::default()
            },
        ),
        "long-haul" => (
            "Long Haul",
            WalkPlan {
                fixes: 168,
                settle: Some(PayoutMode::Normal),
                feed_below: Some(25.0),
                ..WalkPlan::default()
            },
            Expectations {
                distance_tolerance: Some(0.02),
                min_new_cells: 20,
                settled: true,
                ..Expectations::default()
            },
        ),
        "gps-jitter" => (
            "GPS Jitter",
            WalkPlan {
                fixes: 80,
                spike: Some((7, 450.0)),
                poor_accuracy: Some((5, 60.0)),
                ..WalkPlan::default()
            },
            Expectations {
                distance_tolerance: Some(0.05),
                min_rejected: 20,
                ..Expectations::default()
            },
        ),
        "overloaded" => (
            "Overloaded",
            WalkPlan {
                fixes: 90,
                preload_items: 20,
                ..WalkPlan::default()
            },
            Expectations {
                distance_tolerance: Some(0.02),
                min_converted: 5,
                ..Expectations::default()
            },
        ),
        "deep-zone" => (
            "Deep Zone",
            WalkPlan {
                fixes: 430,
                step_m: 25.0,
                feed_below: Some(30.0),
                ..WalkPlan::default()
            },
            Expectations {
                distance_tolerance: Some(0.02),
                deep_zone: true,
                ..Expectations::default()
            },
        ),
        "rescue" => (
            "Rescue",
            WalkPlan {
                fixes: 125,
                start_stamina: Some(2.5),
                ..WalkPlan::default()
            },
            Expectations {
                min_rescues_resolved: 1,
                ..Expectations::default()
            },
        ),
        _ => return None,
    };
    Some(TestScenario {
        key,
        name: name.to_string(),
        description,
        plan,
        expect,
    })
}

/// First broken expectation, if any.
pub fn evaluate_expectations(scenario: &TestScenario, summary: &WalkSummary) -> Option<String> {
    let expect = &scenario.expect;
    if let Some(tolerance) = expect.distance_tolerance {
        let planned = scenario.plan.path_km();
        let drift = (summary.distance_km - planned).abs() / planned.max(f64::EPSILON);
        if drift > tolerance {
            return Some(format!(
                "walked {:.3} km against a {planned:.3} km path",
                summary.distance_km
            ));
        }
    }
    if summary.rejected < expect.min_rejected {
        return Some(format!(
            "expected at least {} rejected fixes, saw {}",
            expect.min_rejected, summary.rejected
        ));
    }
    if summary.new_cells < expect.min_new_cells {
        return Some(format!(
            "expected at least {} new cells, saw {}",
            expect.min_new_cells, summary.new_cells
        ));
    }
    if summary.converted < expect.min_converted {
        return Some(format!(
            "expected at least {} overflow conversions, saw {}",
            expect.min_converted, summary.converted
        ));
    }
    if summary.rescues_resolved < expect.min_rescues_resolved {
        return Some(format!(
            "expected {} resolved rescues, saw {} ({} offered)",
            expect.min_rescues_resolved, summary.rescues_resolved, summary.rescues_offered
        ));
    }
    if expect.deep_zone && !summary.deep_zone_entered {
        return Some("deep zone never entered".to_string());
    }
    if expect.settled {
        if summary.revenue.is_none() {
            return Some("walk was not settled".to_string());
        }
        if summary.final_durability >= 100.0 {
            return Some("settlement left durability untouched".to_string());
        }
    }
    if !summary.unsynced_keys.is_empty() {
        return Some(format!("unsynced keys: {:?}", summary.unsynced_keys));
    }
    None
}
