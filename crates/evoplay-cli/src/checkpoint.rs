//! Checkpoint directories written during a run.
//!
//! ```text
//! logs_<timestamp>/
//!   pop.json            current population (saved-population format)
//!   logbook.json        every generation record so far
//!   settings.json       run configuration, with the seed actually used
//!   runtime.txt         start time, elapsed time and last generation
//!   best/best_<i>.json  hall of fame as model files
//!   last/last_<i>.json  best individuals of the current population
//! ```

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use chrono::{DateTime, Local};
use evoplay_evaluator::{ModelFile, ModelSpec};
use evoplay_training::{GenerationObserver, GenerationProgress, Individual, PopulationFile};
use log::info;

use crate::config::RunConfig;

/// Individuals saved under `last/`, and under `best/` when the hall of fame is disabled.
const SAVED_INDIVIDUALS: usize = 5;

#[derive(Debug)]
pub(crate) struct CheckpointWriter {
    dir: PathBuf,
    logs_every: usize,
    model: ModelSpec,
    started_at: DateTime<Local>,
    started: Instant,
}

impl CheckpointWriter {
    /// Creates `logs_<timestamp>` under `root` and writes `settings.json`.
    pub fn create<P>(root: P, config: &RunConfig) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let started_at = Local::now();
        let dir = root
            .as_ref()
            .join(format!("logs_{}", started_at.format("%Y%m%d_%H%M%S")));
        for sub in ["best", "last"] {
            let path = dir.join(sub);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        crate::util::write_json_file(config, dir.join("settings.json"))?;
        info!("writing checkpoints to {}", dir.display());
        Ok(Self {
            dir,
            logs_every: config.logs_every,
            model: config.model.clone(),
            started_at,
            started: Instant::now(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_due(&self, progress: &GenerationProgress<'_>) -> bool {
        progress.is_final
            || (self.logs_every > 0 && progress.record.generation % self.logs_every == 0)
    }

    fn write(&self, progress: &GenerationProgress<'_>) -> io::Result<()> {
        PopulationFile::from_population(progress.population)
            .save(self.dir.join("pop.json"))
            .map_err(io::Error::other)?;
        write_json(&self.dir.join("logbook.json"), progress.logbook)?;

        let best: Vec<&Individual> = if progress.hall_of_fame.is_enabled() {
            progress.hall_of_fame.entries().iter().collect()
        } else {
            progress
                .population
                .individuals()
                .iter()
                .take(SAVED_INDIVIDUALS)
                .collect()
        };
        self.write_models("best", &best)?;
        let last: Vec<&Individual> = progress
            .population
            .individuals()
            .iter()
            .take(SAVED_INDIVIDUALS)
            .collect();
        self.write_models("last", &last)?;

        let runtime = format!(
            "started: {}\nelapsed: {:.1}s\ngeneration: {}\n",
            self.started_at.to_rfc3339(),
            self.started.elapsed().as_secs_f64(),
            progress.record.generation
        );
        fs::write(self.dir.join("runtime.txt"), runtime)
    }

    fn write_models(&self, kind: &str, individuals: &[&Individual]) -> io::Result<()> {
        for (i, ind) in individuals.iter().enumerate() {
            let path = self.dir.join(kind).join(format!("{kind}_{i}.json"));
            ModelFile::new(self.model.clone(), ind.genes().to_vec())
                .save(&path)
                .map_err(io::Error::other)?;
        }
        Ok(())
    }
}

impl GenerationObserver for CheckpointWriter {
    fn on_generation(&mut self, progress: &GenerationProgress<'_>) -> io::Result<()> {
        if !self.is_due(progress) {
            return Ok(());
        }
        self.write(progress)?;
        info!(
            "checkpoint written for generation {}",
            progress.record.generation
        );
        Ok(())
    }
}

fn write_json<T>(path: &Path, value: &T) -> io::Result<()>
where
    T: serde::Serialize,
{
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()
}
