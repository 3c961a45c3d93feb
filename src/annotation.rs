use tracing::debug;
use uuid::Uuid;

use crate::viewport::ViewportId;

/// A distance measured on a viewport's focal plane.
#[derive(Clone, Debug, PartialEq)]
pub struct LengthMeasurement {
    pub uid: Uuid,
    pub viewport_id: ViewportId,
    /// Tool instance that created the measurement.
    pub tool: String,
    pub points: [[f64; 3]; 2],
    pub length_mm: f64,
}

impl LengthMeasurement {
    pub fn new(viewport_id: &str, tool: &str, start: [f64; 3], end: [f64; 3]) -> Self {
        let length_mm = start
            .iter()
            .zip(end.iter())
            .map(|(a, b)| (b - a).powi(2))
            .sum::<f64>()
            .sqrt();
        Self {
            uid: Uuid::new_v4(),
            viewport_id: viewport_id.to_string(),
            tool: tool.to_string(),
            points: [start, end],
            length_mm,
        }
    }
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    measurements: Vec<LengthMeasurement>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, measurement: LengthMeasurement) -> Uuid {
        let uid = measurement.uid;
        debug!(
            %uid,
            viewport_id = %measurement.viewport_id,
            length_mm = measurement.length_mm,
            "Length measurement added"
        );
        self.measurements.push(measurement);
        uid
    }

    pub fn get(&self, uid: Uuid) -> Option<&LengthMeasurement> {
        self.measurements.iter().find(|m| m.uid == uid)
    }

    pub fn for_viewport<'a>(
        &'a self,
        viewport_id: &'a str,
    ) -> impl Iterator<Item = &'a LengthMeasurement> {
        self.measurements
            .iter()
            .filter(move |m| m.viewport_id == viewport_id)
    }

    pub fn remove(&mut self, uid: Uuid) -> bool {
        let before = self.measurements.len();
        self.measurements.retain(|m| m.uid != uid);
        self.measurements.len() != before
    }

    pub fn remove_viewport(&mut self, viewport_id: &str) {
        self.measurements.retain(|m| m.viewport_id != viewport_id);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn clear(&mut self) {
        self.measurements.clear();
    }
}
