use tracing::{info, warn};

use crate::clock::now_secs;
use crate::error::Result;
use crate::set::ContainerSet;
use crate::state::ClassificationState;
use crate::status::StatusRow;
use flowcon_stats::StatsSampler;

const EPSILON: f64 = 1e-10;

/// The classification state transition table.
fn classify(current: ClassificationState, growth: f64, alpha: f64) -> ClassificationState {
    match (current, growth < alpha) {
        (ClassificationState::Active, true) => ClassificationState::Watching,
        (ClassificationState::Active, false) => ClassificationState::Active,
        (ClassificationState::Watching, true) => ClassificationState::Completing,
        (ClassificationState::Watching, false) => ClassificationState::Active,
        (ClassificationState::Completing, true) => ClassificationState::Completing,
        (ClassificationState::Completing, false) => ClassificationState::Active,
    }
}

/// Run one pass of the growth-efficiency control algorithm over `set`,
/// mutating classification state and CPU limits in place, and return one
/// status row per tracked container.
pub async fn run(
    set: &mut ContainerSet,
    sampler: &StatsSampler,
    alpha: f64,
    interval: f64,
    no_update: bool,
    core_count: usize,
) -> Result<Vec<StatusRow>> {
    info!(alpha, interval, no_update, "running control algorithm");
    let history = sampler.history().await;

    // Step 1 — measure & classify.
    let mut ignore = Vec::with_capacity(set.len());
    let mut losses = Vec::with_capacity(set.len());
    let mut progresses = Vec::with_capacity(set.len());
    let mut growths: Vec<Option<f64>> = Vec::with_capacity(set.len());

    for handle in set.iter_mut() {
        let (loss_i, progress_i, growth_i) =
            handle.growth_tuple(&history, interval, core_count).await?;

        losses.push(loss_i);
        progresses.push(progress_i);
        growths.push(growth_i);

        let Some(growth_i) = growth_i else {
            info!(id = %handle.id, "ignoring container, no measurable growth");
            ignore.push(true);
            continue;
        };
        ignore.push(false);
        handle.state = classify(handle.state, growth_i, alpha);
    }

    // Step 2 — global mode selection.
    let n = set.len();
    let w = set.num_watching();
    let c = set.num_completing();

    if n == 0 {
        warn!("container set emptied mid-computation, returning no status rows");
        return Ok(Vec::new());
    }

    if set.all_completing() && !no_update {
        let new_lim = (1.5 / n as f64).min(1.0) * core_count as f64;
        for handle in set.iter_mut() {
            info!(id = %handle.id, new_lim, "draining: freezing container to fair share");
            handle.frozen = true;
            handle.set_cpu_limit(new_lim).await?;
        }
    } else if w + c < n {
        redistribute(set, &ignore, &growths, no_update, core_count).await?;
    } else {
        for handle in set.iter_mut() {
            if handle.frozen && !no_update {
                handle.set_cpu_limit(core_count as f64 / n as f64).await?;
            }
            if handle.state.is_watching() && !no_update {
                handle
                    .set_cpu_limit(1.5 * core_count as f64 / n as f64)
                    .await?;
            }
        }
    }

    // Step 4 — emit status.
    let now = now_secs();
    let rows = set
        .iter()
        .enumerate()
        .map(|(idx, handle)| StatusRow {
            time: now,
            age: handle.age(),
            ignore: ignore[idx],
            id: handle.id.clone(),
            loss: losses[idx],
            progress: progresses[idx],
            growth: growths[idx],
            limit: handle.cpu_limit,
            limit_norm: handle.cpu_limit.map(|l| l / core_count as f64),
            watching: handle.state.is_watching(),
            completing: handle.state.is_completing(),
        })
        .collect();
    Ok(rows)
}

async fn redistribute(
    set: &mut ContainerSet,
    ignore: &[bool],
    growths: &[Option<f64>],
    no_update: bool,
    core_count: usize,
) -> Result<()> {
    let n = set.len();
    if n == 0 {
        warn!("container set emptied before redistribution, skipping");
        return Ok(());
    }

    let growth_sum: f64 = growths.iter().filter_map(|g| *g).sum();
    info!(growth_sum, "redistributing cpu limits");

    let handles: Vec<_> = set.iter_mut().collect();
    for (i, handle) in handles.into_iter().enumerate() {
        if ignore[i] || handle.state.is_watching() {
            continue;
        }

        let current_norm = handle.cpu_limit.unwrap_or(core_count as f64) / core_count as f64;

        let multiplier = if handle.state.is_completing() {
            let growth_i = growths[i].unwrap_or(0.0);
            1.0 - growth_i / (growth_sum + EPSILON)
        } else {
            let growth_i = growths[i].expect("active, non-ignored container always has growth");
            // growth_sum == 0 only happens when every active growth is
            // itself 0 (below alpha but not yet reclassified); leave the
            // limit unchanged rather than dividing 0 by 0.
            if growth_sum == 0.0 {
                1.0
            } else {
                1.0 + growth_i / growth_sum
            }
        };

        let mut new_lim = current_norm * multiplier;
        new_lim = new_lim.max(1.0 / (10.0 * n as f64));
        new_lim = new_lim.min(1.0);

        if handle.frozen {
            new_lim = 1.0 / n as f64;
        }

        if !no_update {
            let rounded = (new_lim * core_count as f64 * 100.0).round() / 100.0;
            handle.set_cpu_limit(rounded).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::FakeRuntime;
    use std::sync::Arc;

    const ALPHA: f64 = 0.05;

    #[test]
    fn classify_follows_the_state_transition_table() {
        use ClassificationState::*;
        assert_eq!(classify(Active, 0.01, ALPHA), Watching);
        assert_eq!(classify(Active, 0.9, ALPHA), Active);
        assert_eq!(classify(Watching, 0.01, ALPHA), Completing);
        assert_eq!(classify(Watching, 0.9, ALPHA), Active);
        assert_eq!(classify(Completing, 0.01, ALPHA), Completing);
        assert_eq!(classify(Completing, 0.9, ALPHA), Active);
    }

    #[tokio::test]
    async fn mode_a_drains_when_all_completing() {
        let fake = Arc::new(FakeRuntime::default());
        let mut set = ContainerSet::new(fake.clone(), 4);
        fake.set_live_ids(vec!["c1".into(), "c2".into(), "c3".into()]);
        set.reconcile("exp", false).await.unwrap();
        for h in set.iter_mut() {
            h.state = ClassificationState::Completing;
            h.cpu_limit = Some(1.0);
        }

        let sampler = flowcon_stats::StatsSampler::new(fake.clone(), std::time::Duration::from_secs(30))
            .await
            .unwrap();

        let rows = run(&mut set, &sampler, ALPHA, 30.0, false, 4).await.unwrap();

        // every container is ignored this tick (no log history at all), so
        // the classification loop leaves state untouched and Mode A still
        // fires because all three were already completing.
        assert_eq!(rows.len(), 3);
        for h in set.iter() {
            assert!(h.frozen);
            assert_eq!(h.cpu_limit, Some((1.5f64 / 3.0).min(1.0) * 4.0));
        }
    }

    #[tokio::test]
    async fn mode_b_shifts_limits_toward_higher_growth() {
        let fake = Arc::new(FakeRuntime::default());
        let mut set = ContainerSet::new(fake.clone(), 4);
        fake.set_live_ids(vec!["a".into(), "b".into()]);
        set.reconcile("exp", false).await.unwrap();
        for h in set.iter_mut() {
            h.cpu_limit = Some(2.0);
        }

        let growths = vec![Some(0.2), Some(0.8)];
        let ignore = vec![false, false];

        redistribute(&mut set, &ignore, &growths, false, 4)
            .await
            .unwrap();

        let limits: Vec<f64> = set.iter().map(|h| h.cpu_limit.unwrap()).collect();
        assert!((limits[0] - 2.4).abs() < 0.01);
        assert!((limits[1] - 3.6).abs() < 0.01);
    }

    #[tokio::test]
    async fn ignored_container_keeps_its_prior_limit() {
        let fake = Arc::new(FakeRuntime::default());
        let mut set = ContainerSet::new(fake.clone(), 4);
        fake.set_live_ids(vec!["ignored".into(), "active".into()]);
        set.reconcile("exp", false).await.unwrap();
        for h in set.iter_mut() {
            h.cpu_limit = Some(1.5);
        }

        let growths = vec![None, Some(0.3)];
        let ignore = vec![true, false];

        redistribute(&mut set, &ignore, &growths, false, 4)
            .await
            .unwrap();

        let mut iter = set.iter();
        let ignored = iter.next().unwrap();
        let active = iter.next().unwrap();
        assert_eq!(ignored.cpu_limit, Some(1.5));
        assert_ne!(active.cpu_limit, Some(1.5));
    }

    #[tokio::test]
    async fn frozen_container_is_pinned_to_one_over_n() {
        let fake = Arc::new(FakeRuntime::default());
        let mut set = ContainerSet::new(fake.clone(), 4);
        fake.set_live_ids(vec!["a".into(), "b".into()]);
        set.reconcile("exp", false).await.unwrap();
        for h in set.iter_mut() {
            h.cpu_limit = Some(2.0);
        }
        set.iter_mut().next().unwrap().frozen = true;

        let growths = vec![Some(0.2), Some(0.8)];
        let ignore = vec![false, false];
        redistribute(&mut set, &ignore, &growths, false, 4)
            .await
            .unwrap();

        let frozen_limit = set.iter().next().unwrap().cpu_limit.unwrap();
        assert!((frozen_limit - 4.0 / 2.0).abs() < 0.001);
    }
}
