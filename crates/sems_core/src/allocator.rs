use std::collections::HashMap;

use crate::bess::BessController;
use crate::models::{ChargerConfig, SessionSnapshot};

/// Station auxiliary draw, in kW.
const STATIC_LOAD_KW: f64 = 3.0;
/// Reserved headroom below grid capacity, in kW.
const SAFETY_MARGIN_KW: f64 = 5.0;
const MAX_ITERATIONS: usize = 20;
const CONVERGENCE_THRESHOLD_KW: f64 = 0.01;
const BINARY_SEARCH_ITERATIONS: usize = 15;
/// Floor applied to each session's allocation so the water-fill weight
/// `1/a_i` never divides by zero.
const EPSILON_KW: f64 = 1e-3;
/// Duration assumed for BESS discharge/charge commands issued by a
/// recompute.
const BESS_UPDATE_WINDOW_SECS: f64 = 300.0;

/// Pure, stateless-per-call allocation engine: given a snapshot of active
/// sessions, the station's charger configuration, grid capacity, and BESS
/// capability, computes the power each session should be allocated and
/// drives the BESS accordingly.
pub struct Allocator;

impl Allocator {
    /// Runs one full recompute: proportional-fair water-fill, then
    /// per-charger and global cap enforcement, returning the final
    /// allocation per session id. Never fails — degenerate inputs yield
    /// all-zero allocations.
    pub fn recompute(
        sessions: &[SessionSnapshot],
        chargers: &HashMap<String, ChargerConfig>,
        grid_capacity: f64,
        bess: Option<&BessController>,
    ) -> HashMap<uuid::Uuid, f64> {
        if sessions.is_empty() {
            if let Some(bess) = bess {
                bess.set_idle();
            }
            return HashMap::new();
        }

        let grid_budget = (grid_capacity - STATIC_LOAD_KW - SAFETY_MARGIN_KW).max(0.0);
        let bess_budget = bess
            .filter(|b| b.is_available())
            .map(|b| b.available_discharge())
            .unwrap_or(0.0);
        let total_budget = grid_budget + bess_budget;

        if total_budget <= 0.0 {
            return sessions.iter().map(|s| (s.session_id, 0.0)).collect();
        }

        let caps: Vec<f64> = sessions.iter().map(|s| s.vehicle_max_power).collect();
        let water_filled = water_fill(&caps, total_budget);

        let mut allocations: HashMap<uuid::Uuid, f64> = sessions
            .iter()
            .zip(water_filled)
            .map(|(s, a)| (s.session_id, a))
            .collect();

        enforce_charger_caps(&mut allocations, sessions, chargers);
        enforce_global_cap(&mut allocations, total_budget);

        drive_bess(&allocations, grid_capacity, bess);

        allocations
    }
}

/// Maximizes `Σ log(allocated_i)` subject to `Σ allocated_i ≤ budget` and
/// `0 ≤ allocated_i ≤ caps[i]`, via an iterative water-fill: the weight of
/// session i is `1/a_i`, so sessions with a smaller current allocation gain
/// priority, which converges to the proportional-fair optimum.
fn water_fill(caps: &[f64], budget: f64) -> Vec<f64> {
    let n = caps.len();
    let mut a: Vec<f64> = caps.iter().map(|cap| if *cap > 0.0 { EPSILON_KW } else { 0.0 }).collect();
    let target_total = budget.min(caps.iter().sum::<f64>());

    for _ in 0..MAX_ITERATIONS {
        let mut lo = 0.0_f64;
        let mut hi = target_total.max(EPSILON_KW) * 1000.0;

        for _ in 0..BINARY_SEARCH_ITERATIONS {
            let lambda = (lo + hi) / 2.0;
            let sum: f64 = a
                .iter()
                .zip(caps)
                .map(|(ai, cap)| (lambda * ai).min(*cap))
                .sum();
            if sum < target_total {
                lo = lambda;
            } else {
                hi = lambda;
            }
        }

        let lambda_star = (lo + hi) / 2.0;
        let mut max_delta = 0.0_f64;
        for i in 0..n {
            let next = if caps[i] > 0.0 {
                (lambda_star * a[i]).min(caps[i]).max(EPSILON_KW)
            } else {
                0.0
            };
            max_delta = max_delta.max((next - a[i]).abs());
            a[i] = next;
        }
        if max_delta < CONVERGENCE_THRESHOLD_KW {
            break;
        }
    }

    a
}

/// Scales down each charger's sessions uniformly when their sum exceeds
/// the charger's `max_power`. Sessions on an unknown charger id (impossible
/// under the registry's invariants, but defensive) are skipped here with a
/// warning and left untouched by this step.
fn enforce_charger_caps(
    allocations: &mut HashMap<uuid::Uuid, f64>,
    sessions: &[SessionSnapshot],
    chargers: &HashMap<String, ChargerConfig>,
) {
    let mut by_charger: HashMap<&str, Vec<uuid::Uuid>> = HashMap::new();
    for s in sessions {
        by_charger.entry(&s.charger_id).or_default().push(s.session_id);
    }

    for (charger_id, ids) in by_charger {
        let Some(charger) = chargers.get(charger_id) else {
            tracing::warn!(
                charger_id,
                "allocator: session references unknown charger, skipping cap enforcement"
            );
            continue;
        };
        let sum: f64 = ids.iter().filter_map(|id| allocations.get(id)).sum();
        if sum > charger.max_power && sum > 0.0 {
            let scale = charger.max_power / sum;
            for id in ids {
                if let Some(a) = allocations.get_mut(&id) {
                    *a *= scale;
                }
            }
        }
    }
}

/// Scales every allocation down uniformly if the station-wide total still
/// exceeds `total_budget` after per-charger capping.
fn enforce_global_cap(allocations: &mut HashMap<uuid::Uuid, f64>, total_budget: f64) {
    let total: f64 = allocations.values().sum();
    if total > total_budget && total > 0.0 {
        let scale = total_budget / total;
        for a in allocations.values_mut() {
            *a *= scale;
        }
    }
}

/// Commands the BESS based on the realized load this recompute produces.
fn drive_bess(allocations: &HashMap<uuid::Uuid, f64>, grid_capacity: f64, bess: Option<&BessController>) {
    let Some(bess) = bess else { return };
    let realized_load: f64 = allocations.values().sum::<f64>() + STATIC_LOAD_KW;
    if realized_load > grid_capacity {
        bess.discharge(realized_load - grid_capacity, BESS_UPDATE_WINDOW_SECS);
    } else if realized_load < 0.7 * grid_capacity {
        bess.charge((grid_capacity - realized_load) * 0.5, BESS_UPDATE_WINDOW_SECS);
    } else {
        bess.set_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChargerConfig;

    fn snapshot(charger_id: &str, vehicle_max_power: f64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: uuid::Uuid::new_v4(),
            charger_id: charger_id.to_string(),
            vehicle_max_power,
        }
    }

    fn chargers(entries: &[(&str, f64, u8)]) -> HashMap<String, ChargerConfig> {
        entries
            .iter()
            .map(|(id, max_power, connectors)| {
                (
                    id.to_string(),
                    ChargerConfig {
                        id: id.to_string(),
                        max_power: *max_power,
                        connectors: *connectors,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn empty_snapshot_yields_empty_allocation() {
        let result = Allocator::recompute(&[], &HashMap::new(), 400.0, None);
        assert!(result.is_empty());
    }

    #[test]
    fn vehicle_max_zero_allocates_exactly_zero() {
        let sessions = vec![snapshot("CP001", 0.0)];
        let chargers = chargers(&[("CP001", 200.0, 2)]);
        let result = Allocator::recompute(&sessions, &chargers, 400.0, None);
        assert_eq!(result[&sessions[0].session_id], 0.0);
    }

    #[test]
    fn single_charger_two_equal_sessions_split_fairly() {
        let sessions = vec![snapshot("CP001", 150.0), snapshot("CP001", 150.0)];
        let chargers = chargers(&[("CP001", 200.0, 2)]);
        let result = Allocator::recompute(&sessions, &chargers, 400.0, None);

        let a0 = result[&sessions[0].session_id];
        let a1 = result[&sessions[1].session_id];
        assert!((a0 - 100.0).abs() < 0.5, "a0={a0}");
        assert!((a1 - 100.0).abs() < 0.5, "a1={a1}");
        assert!(a0 + a1 <= 200.0 + 1e-6);
    }

    #[test]
    fn per_charger_cap_is_never_exceeded() {
        let sessions = vec![
            snapshot("CP001", 150.0),
            snapshot("CP001", 150.0),
            snapshot("CP002", 200.0),
        ];
        let chargers = chargers(&[("CP001", 100.0, 2), ("CP002", 300.0, 2)]);
        let result = Allocator::recompute(&sessions, &chargers, 1000.0, None);

        let cp001_sum = result[&sessions[0].session_id] + result[&sessions[1].session_id];
        assert!(cp001_sum <= 100.0 + 1e-6, "cp001_sum={cp001_sum}");
    }

    #[test]
    fn global_cap_is_never_exceeded() {
        let sessions = vec![
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
        ];
        let chargers = chargers(&[("CP001", 300.0, 2), ("CP002", 300.0, 2)]);
        let grid_capacity = 400.0;
        let budget = grid_capacity - STATIC_LOAD_KW - SAFETY_MARGIN_KW;

        let result = Allocator::recompute(&sessions, &chargers, grid_capacity, None);
        let total: f64 = result.values().sum();
        assert!(total <= budget + 1e-6, "total={total} budget={budget}");
    }

    #[test]
    fn zero_total_budget_allocates_all_zero() {
        let sessions = vec![snapshot("CP001", 150.0)];
        let chargers = chargers(&[("CP001", 200.0, 2)]);
        // grid capacity smaller than staticLoad+safetyMargin
        let result = Allocator::recompute(&sessions, &chargers, 5.0, None);
        assert_eq!(result[&sessions[0].session_id], 0.0);
    }

    #[test]
    fn zero_total_budget_returns_early_without_driving_bess() {
        let battery = BessController::new(crate::models::BatteryConfig {
            capacity: 0.0,
            power: 0.0,
        });
        let sessions = vec![snapshot("CP001", 150.0)];
        let chargers = chargers(&[("CP001", 200.0, 2)]);
        let before = battery.status().current_power;

        let result = Allocator::recompute(&sessions, &chargers, 5.0, Some(&battery));

        assert_eq!(result[&sessions[0].session_id], 0.0);
        // step 6 (BESS drive) must not run on this early-return path
        assert_eq!(battery.status().current_power, before);
    }

    #[test]
    fn recompute_is_deterministic_for_a_fixed_snapshot() {
        let sessions = vec![snapshot("CP001", 150.0), snapshot("CP001", 150.0)];
        let chargers = chargers(&[("CP001", 200.0, 2)]);
        let first = Allocator::recompute(&sessions, &chargers, 400.0, None);
        let second = Allocator::recompute(&sessions, &chargers, 400.0, None);
        for s in &sessions {
            assert_eq!(first[&s.session_id], second[&s.session_id]);
        }
    }

    #[test]
    fn dynamic_reallocation_tracks_the_documented_sequence() {
        let chargers = chargers(&[("CP001", 300.0, 2), ("CP002", 300.0, 2)]);
        let grid_capacity = 400.0;

        // Two sessions on separate chargers, well under budget: ~150 each.
        let s1 = snapshot("CP001", 150.0);
        let s2 = snapshot("CP002", 150.0);
        let result = Allocator::recompute(&[s1.clone(), s2.clone()], &chargers, grid_capacity, None);
        assert!((result[&s1.session_id] - 150.0).abs() < 0.5);
        assert!((result[&s2.session_id] - 150.0).abs() < 0.5);

        // A third session of equal weight pushes the sum over budget (392):
        // all three converge to ~130.67 each.
        let s3 = snapshot("CP001", 150.0);
        let three = [s1.clone(), s2.clone(), s3.clone()];
        let result = Allocator::recompute(&three, &chargers, grid_capacity, None);
        for s in &three {
            assert!((result[&s.session_id] - 130.67).abs() < 0.5, "{}", result[&s.session_id]);
        }
        let cp001_sum = result[&s1.session_id] + result[&s3.session_id];
        assert!(cp001_sum <= 300.0 + 1e-6);

        // A fourth session: four-way equal split at 392/4 = 98.
        let s4 = snapshot("CP002", 150.0);
        let four = [s1.clone(), s2.clone(), s3.clone(), s4.clone()];
        let result = Allocator::recompute(&four, &chargers, grid_capacity, None);
        for s in &four {
            assert!((result[&s.session_id] - 98.0).abs() < 0.5, "{}", result[&s.session_id]);
        }
        let cp002_sum = result[&s2.session_id] + result[&s4.session_id];
        assert!(cp002_sum <= 300.0 + 1e-6 && (cp002_sum - 196.0).abs() < 1.0);

        // Stopping the first session: three remain, back to ~130.67 each.
        let remaining = [s2.clone(), s3.clone(), s4.clone()];
        let result = Allocator::recompute(&remaining, &chargers, grid_capacity, None);
        for s in &remaining {
            assert!((result[&s.session_id] - 130.67).abs() < 0.5);
        }
    }

    #[test]
    fn bess_boosts_available_budget_above_grid_alone() {
        let battery = BessController::new(crate::models::BatteryConfig {
            capacity: 200.0,
            power: 100.0,
        });
        let sessions = vec![
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
        ];
        let chargers = chargers(&[("CP001", 300.0, 2), ("CP002", 300.0, 2)]);

        let result = Allocator::recompute(&sessions, &chargers, 400.0, Some(&battery));
        let total: f64 = result.values().sum();
        // Without BESS the cap would be 392; with a fully charged 200kWh/100kW
        // battery the available discharge is 100, so total should exceed 392.
        assert!(total > 392.0, "total={total}");
    }

    #[test]
    fn bess_boost_matches_documented_split_of_123_each() {
        let battery = BessController::new(crate::models::BatteryConfig {
            capacity: 200.0,
            power: 100.0,
        });
        assert!((battery.available_discharge() - 100.0).abs() < 1e-9);

        let sessions = vec![
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
            snapshot("CP001", 150.0),
            snapshot("CP002", 150.0),
        ];
        let chargers = chargers(&[("CP001", 300.0, 2), ("CP002", 300.0, 2)]);

        // budget = 400 - 3 - 5 + 100 = 492; four equal-weight 150kW caps sum
        // to 600 > 492, so each converges to 492/4 = 123.
        let result = Allocator::recompute(&sessions, &chargers, 400.0, Some(&battery));
        for s in &sessions {
            assert!((result[&s.session_id] - 123.0).abs() < 0.5, "{}", result[&s.session_id]);
        }
    }
}
