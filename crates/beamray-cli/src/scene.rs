//! Scene and configuration files, CSV export.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use beamray_trace::record::records;
use beamray_trace::{
    Beamline, Behaviour, BundleHistory, EventRecord, EventType, MaterialTables, Ray, TraceConfig, RECORD_COLUMNS,
};
use serde::{Deserialize, Serialize};

/// Everything needed to run one trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    pub beamline: Beamline,
    pub rays: Vec<Ray>,
    #[serde(default)]
    pub materials: MaterialTables,
}

impl Scene {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid scene JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading scene {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing scene {}", path.display()))
    }

    /// Element counts per behaviour, for `beamray info`.
    pub fn element_kinds(&self) -> BTreeMap<&'static str, usize> {
        let mut kinds = BTreeMap::new();
        for element in &self.beamline.elements {
            let name = match element.behaviour {
                Behaviour::Mirror => "mirror",
                Behaviour::PlaneGrating(_) => "plane grating",
                Behaviour::SphereGrating(_) => "sphere grating",
                Behaviour::Slit(_) => "slit",
                Behaviour::ReflectionZonePlate(_) => "reflection zone plate",
                Behaviour::ImagePlane => "image plane",
            };
            *kinds.entry(name).or_insert(0) += 1;
        }
        kinds
    }
}

/// Load a TOML trace configuration, or the defaults for `beamline`.
pub fn load_config(path: Option<&Path>, beamline: &Beamline) -> Result<TraceConfig> {
    let Some(path) = path else {
        return Ok(TraceConfig::for_beamline(beamline));
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Write one CSV row per event. Returns the number of rows.
pub fn write_csv<W: Write>(out: &mut W, history: &BundleHistory, last_only: bool) -> Result<usize> {
    writeln!(out, "{}", RECORD_COLUMNS.join(","))?;

    let mut rows = 0;
    let mut write_row = |record: &EventRecord| -> Result<()> {
        let fields: Vec<String> = record.to_row().iter().map(f64::to_string).collect();
        writeln!(out, "{}", fields.join(","))?;
        rows += 1;
        Ok(())
    };

    if last_only {
        for (ray_id, events) in history.iter().enumerate() {
            if let Some(&event) = events.last() {
                let snapshot = (events.len() - 1) as u32;
                write_row(&EventRecord::from_event(ray_id as u64, snapshot, event))?;
            }
        }
    } else {
        for record in records(history) {
            write_row(&record)?;
        }
    }
    Ok(rows)
}

/// Number of rays per terminal event type.
pub fn terminal_summary(history: &BundleHistory) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for events in history {
        let name = match events.last().map(|e| e.event_type) {
            Some(EventType::FlyOff) => "fly_off",
            Some(EventType::NotEnoughBounces) => "not_enough_bounces",
            Some(EventType::Absorbed) => "absorbed",
            Some(EventType::BeyondHorizon) => "beyond_horizon",
            Some(EventType::FatalError) => "fatal_error",
            Some(EventType::JustHitElement | EventType::Uninit) => "unterminated",
            None => "no_events",
        };
        *summary.entry(name.to_string()).or_insert(0) += 1;
    }
    summary
}
