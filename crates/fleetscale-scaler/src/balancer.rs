//! Replica balancer — level-filling spread of new replicas across pools.
//!
//! # Algorithm
//!
//! ```text
//! pending = replica levels, ascending
//! while remaining > 0 and pending not empty:
//!     level = pending.pop_front()
//!     for pool at level (listing order) while remaining > 0:
//!         pool += 1, move it to level + 1
//!         remaining -= 1
//!     if any pool moved and pending.front() != level + 1:
//!         pending.push_front(level + 1)
//! ```
//!
//! Pools that moved up are visited again only after every pool that was
//! below them has had its turn, so no pool receives a second replica
//! while a lower pool is still waiting for its first. Final counts of
//! touched pools end up at most one level apart from the fill line.
//!
//! Pending levels live in an explicit worklist, so revisiting a level
//! never depends on rewriting a key sequence that is being walked.
//!
//! No pool is raised past [`MAX_REPLICAS`]; a request beyond the fleet's
//! remaining headroom places what fits and logs the rest.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use fleetscale_core::{MAX_REPLICAS, ReplicaCountGroup, ScalingPlan};

/// Spread `desired` additional replicas across the pools in `groups`.
///
/// `groups` is updated in place to reflect the new counts. A `desired`
/// of zero or less returns an empty plan. With no pools at all the plan
/// is empty and the shortfall is logged.
pub fn balance(groups: &mut ReplicaCountGroup, desired: i64) -> ScalingPlan {
    let mut plan = ScalingPlan::new();
    if desired <= 0 {
        info!(desired, "no additional replicas requested");
        return plan;
    }

    let requested = desired.unsigned_abs();
    let mut remaining = requested.min(groups.headroom());
    let mut pending: VecDeque<u32> = groups.levels().collect();

    while remaining > 0 {
        let Some(level) = pending.pop_front() else {
            break;
        };
        if level >= MAX_REPLICAS {
            continue;
        }

        let mut waiting = groups.take(level);
        let mut moved = 0usize;
        while remaining > 0 {
            let Some(pool) = waiting.pop_front() else {
                break;
            };
            plan.record_increment(&pool, level);
            debug!(%pool, from = level, to = level + 1, "pool raised one level");
            groups.push(level + 1, pool);
            remaining -= 1;
            moved += 1;
        }
        groups.restore(level, waiting);

        if moved > 0 && pending.front() != Some(&(level + 1)) {
            pending.push_front(level + 1);
        }
    }

    let placed = plan.total_added();
    if placed < requested {
        warn!(
            desired,
            unassigned = requested - placed,
            "not enough machine pool capacity to place every requested replica"
        );
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscale_core::MachinePool;

    fn pools(counts: &[u32]) -> Vec<MachinePool> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &r)| MachinePool::new(format!("pool-{i}"), r))
            .collect()
    }

    fn plan_for(counts: &[u32], desired: i64) -> ScalingPlan {
        let mut groups = ReplicaCountGroup::from_pools(&pools(counts));
        balance(&mut groups, desired)
    }

    /// Final replica count of every pool after applying `plan`.
    fn final_counts(counts: &[u32], plan: &ScalingPlan) -> Vec<u32> {
        pools(counts)
            .iter()
            .map(|p| plan.get(&p.name).map_or(p.replicas, |c| c.current_replicas))
            .collect()
    }

    #[test]
    fn two_equal_pools_first_listed_gets_extra() {
        let mut groups = ReplicaCountGroup::from_pools(&[
            MachinePool::new("A", 2),
            MachinePool::new("B", 2),
        ]);
        let plan = balance(&mut groups, 3);

        let a = plan.get("A").unwrap();
        let b = plan.get("B").unwrap();
        assert_eq!((a.previous_replicas, a.current_replicas), (2, 4));
        assert_eq!((b.previous_replicas, b.current_replicas), (2, 3));
    }

    #[test]
    fn non_positive_request_is_a_no_op() {
        assert!(plan_for(&[1, 2], 0).is_empty());
        assert!(plan_for(&[1, 2], -4).is_empty());
    }

    #[test]
    fn no_pools_leaves_plan_empty() {
        assert!(plan_for(&[], 5).is_empty());
    }

    #[test]
    fn fills_lowest_pool_first() {
        let plan = plan_for(&[1, 3], 2);
        assert_eq!(final_counts(&[1, 3], &plan), vec![3, 3]);
        assert!(plan.get("pool-1").is_none());
    }

    #[test]
    fn climbs_through_gaps_between_levels() {
        // pool-0 must be raised 0 → 1 → 2 → 3 before pool-1 joins at 3.
        let plan = plan_for(&[0, 3], 5);
        assert_eq!(final_counts(&[0, 3], &plan), vec![4, 4]);
        assert_eq!(plan.get("pool-0").unwrap().previous_replicas, 0);
        assert_eq!(plan.get("pool-1").unwrap().previous_replicas, 3);
    }

    #[test]
    fn merges_into_existing_next_level_after_its_pools() {
        // pool-0 joins level 2 behind pool-1, so pool-1 is raised first.
        let plan = plan_for(&[1, 2], 2);
        assert_eq!(final_counts(&[1, 2], &plan), vec![2, 3]);
    }

    #[test]
    fn equal_pools_take_turns_in_listing_order() {
        let plan = plan_for(&[1, 1, 1], 2);
        assert_eq!(final_counts(&[1, 1, 1], &plan), vec![2, 2, 1]);
    }

    #[test]
    fn updates_groups_in_place() {
        let mut groups = ReplicaCountGroup::from_pools(&pools(&[2, 2]));
        balance(&mut groups, 3);
        assert_eq!(groups.levels().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(groups.pool_count(), 2);
    }

    #[test]
    fn plan_adds_exactly_the_requested_replicas() {
        let fleets: &[&[u32]] = &[&[0], &[2, 2], &[1, 5], &[3, 0, 7, 1], &[4, 4, 4, 4, 4]];
        for counts in fleets {
            for desired in 0..40 {
                let plan = plan_for(counts, desired);
                assert_eq!(
                    plan.total_added(),
                    desired as u64,
                    "fleet {counts:?}, desired {desired}"
                );
            }
        }
    }

    #[test]
    fn no_second_replica_while_a_lower_pool_waits() {
        let fleets: &[&[u32]] = &[&[2, 2], &[1, 5], &[3, 0, 7, 1], &[0, 0, 2, 9]];
        for counts in fleets {
            for desired in 1..30 {
                let plan = plan_for(counts, desired);
                for (name, change) in plan.iter() {
                    if change.added() < 2 {
                        continue;
                    }
                    // `name` was raised again from current - 1, so every pool
                    // that started below that level must have been raised.
                    let second_from = change.current_replicas - 1;
                    for pool in pools(counts) {
                        if pool.replicas < second_from {
                            assert!(
                                plan.get(&pool.name).is_some(),
                                "{name} raised twice while {} untouched (fleet {counts:?}, desired {desired})",
                                pool.name
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn touched_pools_end_within_one_level() {
        let fleets: &[&[u32]] = &[&[2, 2], &[1, 5], &[3, 0, 7, 1]];
        for counts in fleets {
            for desired in 1..30 {
                let plan = plan_for(counts, desired);
                let touched: Vec<u32> = plan.iter().map(|(_, c)| c.current_replicas).collect();
                let max = *touched.iter().max().unwrap();
                let min = *touched.iter().min().unwrap();
                assert!(max - min <= 1, "fleet {counts:?}, desired {desired}");
            }
        }
    }

    #[test]
    fn stops_at_replica_limit() {
        let plan = plan_for(&[MAX_REPLICAS - 1, MAX_REPLICAS], 5);
        assert_eq!(plan.total_added(), 1);
        let change = plan.get("pool-0").unwrap();
        assert_eq!(change.current_replicas, MAX_REPLICAS);
        assert!(plan.get("pool-1").is_none());

        assert!(plan_for(&[MAX_REPLICAS], i64::MAX).is_empty());
    }

    #[test]
    fn large_request_levels_the_whole_fleet() {
        let plan = plan_for(&[1, 5], 10);
        assert_eq!(final_counts(&[1, 5], &plan), vec![8, 8]);
    }
}
