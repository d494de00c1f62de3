//! Flat event records for exporters.
//!
//! Every event is exported as one row of scalar columns so that writers
//! (CSV, HDF5, ...) can stay format-agnostic. Rows hold `f64`; integer
//! columns are exact for values up to 2^53.

use beamray_math::{Point3, Stokes, Vec3};
use thiserror::Error;

use crate::ray::{BundleHistory, Event, EventType};

/// Column names, in row order.
pub const RECORD_COLUMNS: [&str; RECORD_WIDTH] = [
    "ray_id",
    "snapshot_id",
    "position_x",
    "position_y",
    "position_z",
    "event_type",
    "direction_x",
    "direction_y",
    "direction_z",
    "energy",
    "stokes_0",
    "stokes_1",
    "stokes_2",
    "stokes_3",
    "path_length",
    "order",
    "last_element",
];

/// Number of scalar columns per record.
pub const RECORD_WIDTH: usize = 17;

/// Errors decoding a record row.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    /// The row does not have [`RECORD_WIDTH`] columns.
    #[error("record has {found} columns, expected {expected}")]
    WrongWidth {
        /// Required width.
        expected: usize,
        /// Actual width.
        found: usize,
    },

    /// An integer column holds a fractional, negative or non-finite value.
    #[error("column `{column}` holds {value}, which is not a valid integer")]
    InvalidInteger {
        /// Column name.
        column: &'static str,
        /// Offending value.
        value: f64,
    },

    /// The event type code is not known.
    #[error("unknown event type code {0}")]
    UnknownEventType(u32),
}

/// One event together with its identity inside a bundle history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    /// Index of the ray in the traced input.
    pub ray_id: u64,
    /// Index of the event in the ray's history.
    pub snapshot_id: u32,
    /// The recorded event.
    pub event: Event,
}

impl EventRecord {
    /// Wrap an event with its identity.
    pub fn from_event(ray_id: u64, snapshot_id: u32, event: Event) -> Self {
        Self {
            ray_id,
            snapshot_id,
            event,
        }
    }

    /// Drop the identity and return the event.
    pub fn into_event(self) -> Event {
        self.event
    }

    /// Encode as a flat row.
    pub fn to_row(&self) -> [f64; RECORD_WIDTH] {
        let e = &self.event;
        [
            self.ray_id as f64,
            f64::from(self.snapshot_id),
            e.position.x,
            e.position.y,
            e.position.z,
            f64::from(e.event_type.code()),
            e.direction.x,
            e.direction.y,
            e.direction.z,
            e.energy,
            e.stokes[0],
            e.stokes[1],
            e.stokes[2],
            e.stokes[3],
            e.path_length,
            f64::from(e.order),
            e.last_element.map_or(-1.0, f64::from),
        ]
    }

    /// Decode a row produced by [`EventRecord::to_row`].
    pub fn from_row(row: &[f64]) -> Result<Self, RecordError> {
        if row.len() != RECORD_WIDTH {
            return Err(RecordError::WrongWidth {
                expected: RECORD_WIDTH,
                found: row.len(),
            });
        }

        let ray_id = unsigned(row, 0)?;
        let snapshot_id = unsigned(row, 1)? as u32;
        let code = unsigned(row, 5)? as u32;
        let event_type = EventType::from_code(code).ok_or(RecordError::UnknownEventType(code))?;

        let order = row[15];
        if order.fract() != 0.0 || !order.is_finite() {
            return Err(RecordError::InvalidInteger {
                column: RECORD_COLUMNS[15],
                value: order,
            });
        }

        let last_element = if row[16] < 0.0 {
            None
        } else {
            Some(unsigned(row, 16)? as u32)
        };

        Ok(Self {
            ray_id,
            snapshot_id,
            event: Event {
                position: Point3::new(row[2], row[3], row[4]),
                event_type,
                direction: Vec3::new(row[6], row[7], row[8]),
                energy: row[9],
                stokes: Stokes::new(row[10], row[11], row[12], row[13]),
                path_length: row[14],
                order: order as i32,
                last_element,
            },
        })
    }
}

fn unsigned(row: &[f64], column: usize) -> Result<u64, RecordError> {
    let value = row[column];
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(RecordError::InvalidInteger {
            column: RECORD_COLUMNS[column],
            value,
        })
    }
}

/// Records for every event of a bundle history, ray-major.
pub fn records(history: &BundleHistory) -> impl Iterator<Item = EventRecord> + '_ {
    history.iter().enumerate().flat_map(|(ray_id, events)| {
        events
            .iter()
            .enumerate()
            .map(move |(snapshot_id, event)| {
                EventRecord::from_event(ray_id as u64, snapshot_id as u32, *event)
            })
    })
}
