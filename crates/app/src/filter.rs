//! Vehicle class whitelist over raw detector output.

use thiserror::Error;
use vehicle_detect::Detection;

/// Object classes counted as vehicles, with their COCO class ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleClass {
    pub fn from_class_id(class_id: i64) -> Option<Self> {
        match class_id {
            2 => Some(VehicleClass::Car),
            3 => Some(VehicleClass::Motorcycle),
            5 => Some(VehicleClass::Bus),
            7 => Some(VehicleClass::Truck),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VehicleClass::Car => "CAR",
            VehicleClass::Motorcycle => "MOTORCYCLE",
            VehicleClass::Bus => "BUS",
            VehicleClass::Truck => "TRUCK",
        }
    }
}

/// Malformed detector output. A logic-bug signal, never silently dropped;
/// aborts the current frame only.
#[derive(Debug, Error)]
#[error("malformed detection (class {class_id}): {reason}")]
pub struct InvalidDetection {
    pub class_id: i64,
    pub reason: &'static str,
}

/// One vehicle observed in the current frame. Ephemeral; discarded after
/// annotation.
#[derive(Clone, Debug)]
pub struct VehicleDetection {
    pub class: VehicleClass,
    pub bbox: [f32; 4],
}

/// Narrow raw detections to the vehicle whitelist, order preserved.
///
/// Non-vehicle classes are dropped as a matter of course; a whitelisted
/// detection with a degenerate or non-finite bounding box is rejected as
/// [`InvalidDetection`]. No deduplication, no extra confidence thresholding.
pub fn filter_vehicles(detections: &[Detection]) -> Result<Vec<VehicleDetection>, InvalidDetection> {
    let mut vehicles = Vec::new();
    for detection in detections {
        let Some(class) = VehicleClass::from_class_id(detection.class_id) else {
            continue;
        };
        let [x1, y1, x2, y2] = detection.bbox;
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(InvalidDetection {
                class_id: detection.class_id,
                reason: "non-finite bounding box",
            });
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(InvalidDetection {
                class_id: detection.class_id,
                reason: "degenerate bounding box",
            });
        }
        vehicles.push(VehicleDetection {
            class,
            bbox: detection.bbox,
        });
    }
    Ok(vehicles)
}
