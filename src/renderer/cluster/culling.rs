//! Light Culling
//!
//! Assigns point lights to clusters with an inclusive sphere/AABB test in eye
//! space. A light whose sphere only touches a cluster's boundary is assigned to
//! it; a false positive only costs shading time, a false negative would drop
//! light.

use glam::{Mat4, Vec3};

use super::{ClusterAabb, GpuPointLight, LightGridEntry};

/// A light transformed into eye space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeLight {
    pub center: Vec3,
    pub radius: f32,
}

/// `true` when the sphere intersects or touches the box.
#[inline]
#[must_use]
pub fn sphere_intersects_aabb(center: Vec3, radius: f32, aabb: &ClusterAabb) -> bool {
    let closest = center.clamp(aabb.min3(), aabb.max3());
    closest.distance_squared(center) <= radius * radius
}

#[must_use]
pub fn lights_to_eye(view: &Mat4, lights: &[GpuPointLight]) -> Vec<EyeLight> {
    lights
        .iter()
        .map(|light| EyeLight {
            center: view.transform_point3(light.position()),
            radius: light.range(),
        })
        .collect()
}

/// Culls `lights` against one cluster.
///
/// `slots` is the cluster's own range of the light index list; at most
/// `slots.len()` indices are written, in light-list order. Returns the grid
/// entry to store for the cluster.
pub fn cull_cluster(aabb: &ClusterAabb, lights: &[EyeLight], offset: u32, slots: &mut [u32]) -> LightGridEntry {
    let mut count = 0usize;
    for (index, light) in lights.iter().enumerate() {
        if count == slots.len() {
            break;
        }
        if sphere_intersects_aabb(light.center, light.radius, aabb) {
            slots[count] = index as u32;
            count += 1;
        }
    }
    LightGridEntry {
        offset,
        count: count as u32,
    }
}

/// Culls every cluster in `[first, first + aabbs.len())`.
///
/// `grid` and `indices` are the complete light grid and light index list.
/// Clusters outside the range are left untouched.
pub fn cull_clusters(
    first: u32,
    aabbs: &[ClusterAabb],
    lights: &[EyeLight],
    capacity: u32,
    grid: &mut [LightGridEntry],
    indices: &mut [u32],
) {
    let capacity = capacity as usize;
    for (i, aabb) in aabbs.iter().enumerate() {
        let cluster = first as usize + i;
        let Some(entry) = grid.get_mut(cluster) else {
            return;
        };
        let start = cluster * capacity;
        let end = (start + capacity).min(indices.len());
        let slots = indices.get_mut(start..end).unwrap_or_default();
        *entry = cull_cluster(aabb, lights, start as u32, slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> ClusterAabb {
        ClusterAabb::new(Vec3::new(-1.0, -1.0, -2.0), Vec3::new(1.0, 1.0, -1.0))
    }

    #[test]
    fn tangent_sphere_is_included() {
        assert!(sphere_intersects_aabb(Vec3::new(0.0, 0.0, -0.5), 0.5, &unit_box()));
        assert!(!sphere_intersects_aabb(Vec3::new(0.0, 0.0, -0.5), 0.49, &unit_box()));
    }

    #[test]
    fn sphere_inside_box_is_included() {
        assert!(sphere_intersects_aabb(Vec3::new(0.0, 0.0, -1.5), 0.01, &unit_box()));
    }

    #[test]
    fn cull_cluster_truncates_in_list_order() {
        let lights: Vec<EyeLight> = (0..5)
            .map(|i| EyeLight {
                center: Vec3::new(0.0, 0.0, -1.5),
                radius: 0.1 + i as f32,
            })
            .collect();
        let mut slots = [u32::MAX; 3];
        let entry = cull_cluster(&unit_box(), &lights, 6, &mut slots);
        assert_eq!(entry, LightGridEntry { offset: 6, count: 3 });
        assert_eq!(slots, [0, 1, 2]);
    }

    #[test]
    fn cull_clusters_writes_zero_count_for_empty_clusters() {
        let aabbs = [unit_box(), ClusterAabb::new(Vec3::splat(10.0), Vec3::splat(11.0))];
        let lights = [EyeLight {
            center: Vec3::new(0.0, 0.0, -1.5),
            radius: 1.0,
        }];
        let mut grid = [LightGridEntry { offset: 99, count: 99 }; 2];
        let mut indices = [7u32; 4];
        cull_clusters(0, &aabbs, &lights, 2, &mut grid, &mut indices);
        assert_eq!(grid[0], LightGridEntry { offset: 0, count: 1 });
        assert_eq!(grid[1], LightGridEntry { offset: 2, count: 0 });
        assert_eq!(indices[0], 0);
    }
}
