use std::sync::Arc;

use flowcon_runtime::ContainerRuntime;
use tracing::info;

use crate::error::Result;
use crate::handle::ContainerHandle;

/// The tracked containers for one trial. Order is insertion order and
/// carries no meaning beyond stable iteration.
pub struct ContainerSet {
    runtime: Arc<dyn ContainerRuntime>,
    handles: Vec<ContainerHandle>,
    core_count: usize,
}

impl ContainerSet {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, core_count: usize) -> Self {
        Self {
            runtime,
            handles: Vec::new(),
            core_count,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContainerHandle> {
        self.handles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContainerHandle> {
        self.handles.iter_mut()
    }

    pub fn ids(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.id.clone()).collect()
    }

    /// Reconcile tracked handles against the runtime's live containers.
    /// Idempotent: a second call with no runtime change makes no further
    /// mutations.
    pub async fn reconcile(&mut self, experiment_name: &str, no_update: bool) -> Result<()> {
        info!("reconciling container set with runtime");
        let live: Vec<String> = self.runtime.list_ids().await?;

        for id in &live {
            if !self.handles.iter().any(|h| &h.id == id) {
                info!(id, "adding newly observed container");
                let handle = ContainerHandle::new(id.clone(), self.runtime.clone());
                handle.check_invariants()?;
                self.handles.push(handle);
            }
        }

        let mut i = 0;
        while i < self.handles.len() {
            if !live.contains(&self.handles[i].id) {
                let departed = self.handles.remove(i);
                info!(id = %departed.id, "removing departed container");
                export_loss_csv(&departed, experiment_name).await?;
            } else {
                i += 1;
            }
        }

        if !no_update {
            for handle in &mut self.handles {
                if handle.cpu_limit.is_none() {
                    info!(id = %handle.id, limit = self.core_count as f64, "initializing unset cpu limit");
                    handle.set_cpu_limit(self.core_count as f64).await?;
                }
            }
        }

        Ok(())
    }

    /// Vacuously true over an empty set, matching the universal
    /// quantification over "every tracked container" this reads as.
    pub fn all_completing(&self) -> bool {
        self.handles.iter().all(|h| h.state.is_completing())
    }

    pub fn num_watching(&self) -> usize {
        self.handles.iter().filter(|h| h.state.is_watching()).count()
    }

    pub fn num_completing(&self) -> usize {
        self.handles
            .iter()
            .filter(|h| h.state.is_completing())
            .count()
    }

    /// Kill every tracked container, exporting its loss log first.
    pub async fn killall(&mut self, experiment_name: &str) -> Result<()> {
        for handle in &self.handles {
            export_loss_csv(handle, experiment_name).await?;
            self.runtime.kill(&handle.id).await?;
        }
        self.handles.clear();
        Ok(())
    }
}

async fn export_loss_csv(handle: &ContainerHandle, experiment_name: &str) -> Result<()> {
    let table = handle.loss_table().await?;
    let path = format!("{experiment_name}_{}.csv", handle.id);
    info!(path, "saving container loss log");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["loss", "time"])?;
    for sample in &table {
        writer.write_record([sample.loss.to_string(), sample.time.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcon_runtime::FakeRuntime;

    #[tokio::test]
    async fn all_completing_is_vacuously_true_for_empty_set() {
        let fake = Arc::new(FakeRuntime::default());
        let set = ContainerSet::new(fake, 4);

        assert!(set.is_empty());
        assert!(set.all_completing());
    }

    #[tokio::test]
    async fn reconcile_adds_new_containers_and_initializes_cpu_limit() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into(), "c2".into()]);
        let mut set = ContainerSet::new(fake, 4);

        set.reconcile("reconcile_add_test", false).await.unwrap();

        assert_eq!(set.len(), 2);
        for handle in set.iter() {
            assert_eq!(handle.cpu_limit, Some(4.0));
        }
    }

    /// Property 4: calling `reconcile` twice with no runtime change makes no
    /// further set-membership or cpu_limit change.
    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into()]);
        let mut set = ContainerSet::new(fake, 4);

        set.reconcile("reconcile_idempotent_test", false).await.unwrap();
        let ids_after_first = set.ids();
        let limit_after_first = set.iter().next().unwrap().cpu_limit;

        set.reconcile("reconcile_idempotent_test", false).await.unwrap();

        assert_eq!(set.ids(), ids_after_first);
        assert_eq!(set.iter().next().unwrap().cpu_limit, limit_after_first);
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_removes_departed_containers_and_exports_loss_csv() {
        let fake = Arc::new(FakeRuntime::default());
        fake.set_live_ids(vec!["c1".into()]);
        let mut set = ContainerSet::new(fake.clone(), 4);
        set.reconcile("reconcile_remove_test", false).await.unwrap();
        assert_eq!(set.len(), 1);

        fake.set_live_ids(vec![]);
        set.reconcile("reconcile_remove_test", false).await.unwrap();

        assert!(set.is_empty());
        let path = "reconcile_remove_test_c1.csv";
        assert!(std::path::Path::new(path).exists());
        let _ = std::fs::remove_file(path);
    }
}
