//! Query shapes and read-only proximity access.
use super::{SpacePartition, SpatialEntry};
use crate::types::{EntityId, ObjectTypeMask, Phase, Vec3};

/// Query volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Points within `radius` of `center` (3D distance)
    Sphere { center: Vec3, radius: f32 },
    /// Axis-aligned box, inclusive on every face
    Box { min: Vec3, max: Vec3 },
}

impl Shape {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Shape::Sphere { center, radius }
    }

    pub fn aabb(min: Vec3, max: Vec3) -> Self {
        Shape::Box { min, max }
    }

    /// Whether `point` lies inside the shape.
    pub fn contains(&self, point: &Vec3) -> bool {
        match self {
            Shape::Sphere { center, radius } => center.distance_sq(point) <= radius * radius,
            Shape::Box { min, max } => {
                point.x >= min.x
                    && point.x <= max.x
                    && point.y >= min.y
                    && point.y <= max.y
                    && point.z >= min.z
                    && point.z <= max.z
            }
        }
    }

    /// Whether the shape's X/Y footprint touches the rectangle.
    pub(crate) fn touches_rect(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> bool {
        match self {
            Shape::Sphere { center, radius } => {
                let cx = center.x.clamp(min_x, max_x);
                let cy = center.y.clamp(min_y, max_y);
                let dx = center.x - cx;
                let dy = center.y - cy;
                dx * dx + dy * dy <= radius * radius
            }
            Shape::Box { min, max } => {
                min.x <= max_x && max.x >= min_x && min.y <= max_y && max.y >= min_y
            }
        }
    }
}

/// Read-only view of a shard's partition handed to NPC brains.
#[derive(Clone, Copy)]
pub struct ProximityView<'a> {
    partition: &'a SpacePartition,
}

impl<'a> ProximityView<'a> {
    pub(crate) fn new(partition: &'a SpacePartition) -> Self {
        Self { partition }
    }

    /// Objects of the given kinds within `radius` of `center` visible in `phase`.
    pub fn nearby(
        &self,
        center: Vec3,
        radius: f32,
        filter: ObjectTypeMask,
        phase: Phase,
    ) -> Vec<SpatialEntry> {
        self.partition
            .entities_in_area(&Shape::sphere(center, radius), filter, phase, usize::MAX)
    }

    /// Closest object matching `filter`, excluding `exclude`.
    pub fn closest(
        &self,
        center: Vec3,
        radius: f32,
        filter: ObjectTypeMask,
        phase: Phase,
        exclude: Option<EntityId>,
    ) -> Option<SpatialEntry> {
        self.nearby(center, radius, filter, phase)
            .into_iter()
            .filter(|entry| Some(entry.id) != exclude)
            .min_by(|a, b| {
                a.point
                    .distance_sq(&center)
                    .total_cmp(&b.point.distance_sq(&center))
            })
    }
}
