use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::DashboardConfig;
use crate::error::Result;
use crate::export::{export_csv, ExportSummary};
use crate::history::{HistoryEntry, PlotSeries, RollingHistory};
use crate::sensors::SampleSource;
use crate::types::Sample;

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
}

/// Text for the numeric readouts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Labels {
    pub x: String,
    pub y: String,
    pub z: String,
    pub heading: String,
    pub toggle: String,
}

impl Labels {
    fn new(entry: Option<&HistoryEntry>, state: RunState) -> Self {
        let toggle = match state {
            RunState::Stopped => "▶ Start",
            RunState::Running => "⏸ Stop",
        }
        .to_string();

        match entry {
            Some(entry) => Labels {
                x: format!("X: {:.2} µT", entry.sample.x),
                y: format!("Y: {:.2} µT", entry.sample.y),
                z: format!("Z: {:.2} µT", entry.sample.z),
                heading: format!("Heading: {:.2}°", entry.heading),
                toggle,
            },
            None => Labels {
                x: "X: --- µT".to_string(),
                y: "Y: --- µT".to_string(),
                z: "Z: --- µT".to_string(),
                heading: "Heading: ---°".to_string(),
                toggle,
            },
        }
    }
}

/// Everything one refresh pushes to the display.
#[derive(Clone, Debug, Serialize)]
pub struct Frame {
    pub timestamp_ms: i64,
    pub state: RunState,
    pub sample: Option<Sample>,
    pub heading: Option<f64>,
    pub needle_angle_rad: Option<f64>,
    pub labels: Labels,
    pub series: PlotSeries,
    pub source_healthy: bool,
}

/// Result of pressing the start/stop control.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToggleOutcome {
    pub state: RunState,
    pub export: Option<ExportSummary>,
}

/// Run state, rolling history and sample source of one dashboard.
pub struct Session {
    state: RunState,
    history: RollingHistory,
    source: Box<dyn SampleSource>,
    export_path: PathBuf,
}

impl Session {
    pub fn new(source: Box<dyn SampleSource>, capacity: usize, export_path: impl Into<PathBuf>) -> Self {
        Session {
            state: RunState::Stopped,
            history: RollingHistory::new(capacity),
            source,
            export_path: export_path.into(),
        }
    }

    pub fn from_config(config: &DashboardConfig, source: Box<dyn SampleSource>) -> Self {
        Self::new(source, config.capacity, config.export_path.clone())
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn source_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Begin honouring ticks. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.state = RunState::Running;
        log::info!("Run started ({} source)", self.source.name());
        true
    }

    /// Stop honouring ticks and export the history.
    ///
    /// The state is `Stopped` afterwards even if the export fails. Stopping an
    /// already stopped session exports nothing and returns `Ok(None)`.
    pub fn stop(&mut self) -> Result<Option<ExportSummary>> {
        if !self.is_running() {
            return Ok(None);
        }
        self.state = RunState::Stopped;
        let summary = export_csv(&self.export_path, &self.history)?;
        log::info!(
            "Run stopped, saved {} samples to {}",
            summary.rows,
            summary.path.display()
        );
        Ok(Some(summary))
    }

    pub fn toggle(&mut self) -> Result<ToggleOutcome> {
        let export = match self.state {
            RunState::Stopped => {
                self.start();
                None
            }
            RunState::Running => self.stop()?,
        };
        Ok(ToggleOutcome {
            state: self.state,
            export,
        })
    }

    /// One refresh: acquire a sample, record it and build the frame.
    /// Does nothing while stopped.
    pub fn tick(&mut self) -> Option<Frame> {
        if !self.is_running() {
            return None;
        }
        let sample = self.source.next_sample();
        self.history.push(sample);
        Some(self.frame())
    }

    /// Frame for the current history without acquiring anything.
    pub fn frame(&self) -> Frame {
        let latest = self.history.latest();
        Frame {
            timestamp_ms: Utc::now().timestamp_millis(),
            state: self.state,
            sample: latest.map(|e| e.sample),
            heading: latest.map(|e| e.heading),
            needle_angle_rad: latest.map(|e| self.source.needle_angle(&e.sample, e.heading)),
            labels: Labels::new(latest, self.state),
            series: self.history.series(),
            source_healthy: self.source.is_healthy(),
        }
    }
}

pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drive `session` at a fixed period, publishing each refreshed frame.
///
/// Ticks are serial; a slow tick delays the next one instead of overlapping it.
pub async fn refresh_loop(session: SharedSession, period: Duration, frames: Arc<watch::Sender<Frame>>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let frame = lock_session(&session).tick();
        if let Some(frame) = frame {
            frames.send_replace(frame);
        }
    }
}
