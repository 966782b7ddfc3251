//! Scheduled reseed job
//!
//! Every `SCHEDULE_HOUR` hours the people collection is replaced with the
//! records listed in `RESEED_FILE`.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::people::{PeopleService, PersonRecord};
use crate::types::{KindredError, Result};

/// Load reseed records from a JSON array file
pub async fn load_records(path: &Path) -> Result<Vec<PersonRecord>> {
    let raw = tokio::fs::read(path).await?;
    let value: Value = serde_json::from_slice(&raw)?;
    let Value::Array(items) = value else {
        return Err(KindredError::BadRequest(format!(
            "{} must contain a JSON array of people",
            path.display()
        )));
    };
    items.into_iter().map(PersonRecord::from_json).collect()
}

pub struct Reseeder {
    people: Arc<PeopleService>,
    source: PathBuf,
}

impl Reseeder {
    pub fn new(people: Arc<PeopleService>, source: PathBuf) -> Self {
        Self { people, source }
    }

    /// Run one reseed, returning how many people were written
    pub async fn run_once(&self) -> Result<usize> {
        let records = load_records(&self.source).await?;
        let count = self.people.reseed(records).await?;
        info!(count, source = %self.source.display(), "Reseeded people collection");
        Ok(count)
    }
}

/// Sleep between reseeds for a schedule of `hours`
pub fn reseed_interval(hours: u64) -> Duration {
    Duration::from_secs(hours.max(1).saturating_mul(60 * 60))
}

/// Start the recurring reseed task, if configured
pub fn spawn_reseed_task(
    people: Arc<PeopleService>,
    schedule_hours: Option<u64>,
    source: Option<PathBuf>,
) -> Option<tokio::task::JoinHandle<()>> {
    let hours = schedule_hours?;
    let Some(source) = source else {
        warn!("SCHEDULE_HOUR is set but RESEED_FILE is not; reseed job disabled");
        return None;
    };

    let reseeder = Reseeder::new(people, source);
    let interval = reseed_interval(hours);
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = reseeder.run_once().await {
                error!("Reseed failed: {}", e);
            }
        }
    });
    info!("Reseed task started (every {} hour(s))", hours);
    Some(handle)
}
