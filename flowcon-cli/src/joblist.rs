use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use flowcon_runtime::ContainerRuntime;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

const BUILTIN_IMAGES: &[&str] = &[
    "wzheng33/gru:latest",
    "wzheng33/lstmcfc:latest",
    "wzheng33/lstmcrf:latest",
    "wzheng33/tc10:latest",
];

#[derive(Debug, Deserialize)]
struct JobRow {
    seconds: u64,
    images: String,
}

/// Read a `(seconds, images)` job table and launch each image at its
/// scheduled second, ticking one second at a time until the last job has
/// fired.
pub async fn launch_jobs(
    runtime: Arc<dyn ContainerRuntime>,
    joblist_path: impl AsRef<Path>,
) -> anyhow::Result<()> {
    let mut reader = csv::Reader::from_path(joblist_path)?;
    let rows: Vec<JobRow> = reader.deserialize().collect::<Result<_, _>>()?;
    let stop = rows.iter().map(|r| r.seconds).max().unwrap_or(0);

    for tick in 0..=stop {
        for row in rows.iter().filter(|r| r.seconds == tick) {
            info!(image = %row.images, "launching container with `docker run`");
            runtime.create(&row.images, ".", &[]).await?;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

/// Write `<name>_jobtable.csv` with `containers` rows sampling `models`
/// distinct images from a small built-in list across `0..seconds`.
pub fn make_joblist(name: &str, seconds: u64, models: usize, containers: usize) -> anyhow::Result<()> {
    use rand::seq::SliceRandom;

    let mut rng = rand::rng();
    let model_count = models.min(BUILTIN_IMAGES.len()).max(1);
    let chosen: Vec<&str> = BUILTIN_IMAGES
        .choose_multiple(&mut rng, model_count)
        .copied()
        .collect();

    let mut rows: Vec<(u64, &str)> = (0..containers)
        .map(|_| {
            let image = *chosen.choose(&mut rng).expect("model_count > 0");
            let sec = rng.random_range(0..seconds.max(1));
            (sec, image)
        })
        .collect();
    rows.sort_by_key(|(sec, _)| *sec);

    let path = format!("{name}_jobtable.csv");
    info!(path, rows = rows.len(), "writing job table");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["seconds", "images"])?;
    for (sec, image) in rows {
        writer.write_record([sec.to_string(), image.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}
