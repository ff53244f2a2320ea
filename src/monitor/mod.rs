//! Generic wait/notify-by-polling for awaitable assets.
//!
//! No native blocking happens here: a "wait" records interest in an
//! [`AssetMonitor`], the [`MonitorRegistry`] indexes pending deadlines, and
//! the [`SweepDriver`] periodically evaluates timeout/readiness. Wake-ups are
//! batched through an [`ActivateSet`] and applied after the triggering
//! operation finished.

mod activate;
mod asset;
mod registry;

pub use activate::ActivateSet;
pub use asset::{AssetKind, AssetMonitor};
pub use registry::{MonitorRegistry, SweepDriver};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::Escalation;
    use crate::events::Bus;
    use crate::exec::test_support::{collector_job, CollectingTeam};

    fn join_monitor(registry: &Arc<MonitorRegistry>) -> Arc<AssetMonitor> {
        AssetMonitor::new(AssetKind::ThreadJoin { thread: 1 }, registry.clone(), Bus::new(4))
    }

    #[test]
    fn test_resolution_before_check_never_times_out() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        assert!(monitor.wait(job, Some(10), None, &mut set));
        assert!(set.is_empty());

        // Resolution wins over a delayed check.
        monitor.activate_all(&mut set, false);
        set.apply();
        assert_eq!(team.woken(), 1);
        assert_eq!(team.failures().len(), 0);

        // The late check finds nothing to fail.
        let mut set = ActivateSet::new();
        monitor.check(1_000, &mut set);
        assert!(set.is_empty());
    }

    #[test]
    fn test_expired_waiter_failed_exactly_once() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        monitor.wait(job, Some(10), Some(7), &mut set);

        let mut set = ActivateSet::new();
        monitor.check(10, &mut set);
        set.apply();
        assert_eq!(
            team.failures(),
            vec![Escalation::FlowJoinTimedOut { token: Some(7) }]
        );

        // Re-check: the waiter is gone, nothing fails twice.
        let mut set = ActivateSet::new();
        monitor.check(10_000, &mut set);
        assert!(set.is_empty());
    }

    #[test]
    fn test_selective_expiry_keeps_unexpired_waiter() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();
        let short = collector_job(&team);
        let long = collector_job(&team);

        let mut set = ActivateSet::new();
        monitor.wait(short, Some(10), Some(1), &mut set);
        monitor.wait(long, Some(2_000_000), Some(2), &mut set);

        let mut set = ActivateSet::new();
        monitor.check(10, &mut set);
        set.apply();
        assert_eq!(
            team.failures(),
            vec![Escalation::FlowJoinTimedOut { token: Some(1) }]
        );
        assert_eq!(monitor.waiter_count(), 1);

        // Normal activation reaches the survivor.
        let mut set = ActivateSet::new();
        monitor.activate_all(&mut set, true);
        set.apply();
        assert_eq!(team.woken(), 1);
    }

    #[test]
    fn test_permanent_failure_latches_future_waits() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();

        let mut set = ActivateSet::new();
        monitor.fail_all(
            &mut set,
            Escalation::FlowJoinTimedOut { token: None },
            true,
        );
        set.apply();

        // A later wait resolves immediately with the same failure.
        let late = collector_job(&team);
        let mut set = ActivateSet::new();
        assert!(!monitor.wait(late, None, None, &mut set));
        set.apply();
        assert_eq!(team.failures().len(), 1);
    }

    #[test]
    fn test_sweep_checks_due_monitors_and_reenlists() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();
        let short = collector_job(&team);
        let long = collector_job(&team);

        let mut set = ActivateSet::new();
        monitor.wait(short, Some(5), None, &mut set);
        monitor.wait(long, Some(50), None, &mut set);
        assert_eq!(registry.len(), 2);

        let mut set = ActivateSet::new();
        assert_eq!(registry.sweep(5, &mut set), 1);
        set.apply();
        assert_eq!(team.failures().len(), 1);
        // Re-enlisted at the surviving deadline.
        assert!(!registry.is_empty());

        let mut set = ActivateSet::new();
        registry.sweep(50, &mut set);
        set.apply();
        assert_eq!(team.failures().len(), 2);
    }

    #[test]
    fn test_sweep_skips_future_deadlines() {
        let registry = MonitorRegistry::arc();
        let monitor = join_monitor(&registry);
        let team = CollectingTeam::arc();
        let job = collector_job(&team);

        let mut set = ActivateSet::new();
        monitor.wait(job, Some(100), None, &mut set);

        let mut set = ActivateSet::new();
        assert_eq!(registry.sweep(99, &mut set), 0);
        assert!(set.is_empty());
        assert_eq!(monitor.waiter_count(), 1);
    }
}
