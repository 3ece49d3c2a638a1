//! Dendrogram geometry in axis space: `u` runs along the leaves, `v` runs
//! along the merge heights with `v = 0` at the tallest merge and
//! `v = axis_height` at the leaves. Panel orientation maps `(u, v)` to
//! pixel `(x, y)` last.

use anyhow::{bail, Result};
use rustc_hash::FxHashMap;

use crate::input::AxisClustering;

/// A point in axis space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisPoint {
    pub u: f64,
    pub v: f64,
}

/// The U-shaped connector of one merge step: a riser at `u1` from `v1`, a
/// rung at `junction_v`, a riser at `u2` down to `v2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polyline {
    pub cluster_id: u32,
    pub u1: f64,
    pub v1: f64,
    pub u2: f64,
    pub v2: f64,
    pub junction_v: f64,
}

impl Polyline {
    /// The three axis-aligned segments as `(u_a, v_a, u_b, v_b)` tuples.
    pub fn segments(&self) -> [(f64, f64, f64, f64); 3] {
        [
            (self.u1, self.v1, self.u1, self.junction_v),
            (self.u1, self.junction_v, self.u2, self.junction_v),
            (self.u2, self.junction_v, self.u2, self.v2),
        ]
    }
}

/// A formed cluster: where its junction sits, which leaves it covers and
/// which earlier clusters merged into it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCluster {
    pub position: AxisPoint,
    /// 0-based input indices of every leaf under this cluster.
    pub leaves: Vec<usize>,
    /// Ids of the directly merged sub-clusters, at most two.
    pub child_cluster_ids: Vec<u32>,
    pub segment: Polyline,
}

/// Geometry for one axis. Cluster ids are the 1-based merge step numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct DendrogramLayout {
    pub axis_height: f64,
    pub step_size: f64,
    pub leaf_count: usize,
    /// Indexed by 0-based leaf input index.
    pub leaf_positions: Vec<AxisPoint>,
    pub clusters: FxHashMap<u32, MergedCluster>,
    /// In merge order, one per step.
    pub polylines: Vec<Polyline>,
}

/// Compute dendrogram geometry for one axis.
///
/// Heights scale linearly so the tallest merge lands exactly at `v = 0`;
/// a max height of zero renders every merge flat at the leaf line instead
/// of dividing by zero.
pub fn layout_axis(axis: &AxisClustering, axis_height: f64, step_size: f64) -> Result<DendrogramLayout> {
    if axis.merges.len() != axis.heights.len() {
        bail!(
            "{} merge steps carry {} heights",
            axis.merges.len(),
            axis.heights.len()
        );
    }
    let n = axis.leaf_count();

    // display slot of each leaf input index
    let mut slot_of = vec![usize::MAX; n];
    for (slot, &input) in axis.order.iter().enumerate() {
        if input >= n {
            bail!("display order names leaf {} of {}", input + 1, n);
        }
        slot_of[input] = slot;
    }

    let mut leaf_positions = Vec::with_capacity(n);
    for input in 0..n {
        let slot = slot_of[input];
        if slot == usize::MAX {
            bail!("leaf {} is missing from the display order", input + 1);
        }
        leaf_positions.push(AxisPoint {
            u: step_size * (slot as f64 + 0.5),
            v: axis_height,
        });
    }

    let mut layout = DendrogramLayout {
        axis_height,
        step_size,
        leaf_count: n,
        leaf_positions,
        clusters: FxHashMap::default(),
        polylines: Vec::with_capacity(axis.merges.len()),
    };
    if axis.merges.is_empty() {
        return Ok(layout);
    }

    let max_height = axis.heights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let scale = axis_height / if max_height > 0.0 { max_height } else { 1.0 };

    for (step, merge) in axis.merges.iter().enumerate() {
        let (p1, leaves1, child1) = resolve_ref(merge.n1, step, &layout)?;
        let (p2, leaves2, child2) = resolve_ref(merge.n2, step, &layout)?;

        let junction_v = axis_height - axis.heights[step] * scale;
        let position = AxisPoint {
            u: (p1.u + p2.u) / 2.0,
            v: junction_v,
        };

        let mut leaves = leaves1;
        leaves.extend(leaves2);
        let child_cluster_ids: Vec<u32> = [child1, child2].into_iter().flatten().collect();

        let id = step as u32 + 1;
        let segment = Polyline {
            cluster_id: id,
            u1: p1.u,
            v1: p1.v,
            u2: p2.u,
            v2: p2.v,
            junction_v,
        };
        layout.polylines.push(segment);
        layout.clusters.insert(
            id,
            MergedCluster {
                position,
                leaves,
                child_cluster_ids,
                segment,
            },
        );
    }

    Ok(layout)
}

/// Resolve one side of a merge step to its anchor point, covered leaves and
/// (for cluster references) the child cluster id.
fn resolve_ref(n: i32, step: usize, layout: &DendrogramLayout) -> Result<(AxisPoint, Vec<usize>, Option<u32>)> {
    if n == 0 {
        bail!("merge step {}: cluster reference 0 is not valid", step + 1);
    }
    if n < 0 {
        let input = (-n - 1) as usize;
        if input >= layout.leaf_count {
            bail!(
                "merge step {}: leaf reference {} exceeds {} leaves",
                step + 1,
                -n,
                layout.leaf_count
            );
        }
        return Ok((layout.leaf_positions[input], vec![input], None));
    }
    let id = n as u32;
    // only merges from earlier steps are in the map at this point
    match layout.clusters.get(&id) {
        Some(cluster) => Ok((cluster.position, cluster.leaves.clone(), Some(id))),
        None => bail!("merge step {}: references cluster {} before it is formed", step + 1, id),
    }
}

/// Every cluster id under `id`, depth first, not including `id` itself.
pub fn descendants(layout: &DendrogramLayout, id: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        if let Some(cluster) = layout.clusters.get(&current) {
            for &child in &cluster.child_cluster_ids {
                out.push(child);
                stack.push(child);
            }
        }
    }
    out
}

/// How axis space maps onto the panel: a column dendrogram hangs above the
/// matrix with leaves along x, a row dendrogram sits beside it with leaves
/// along y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Column,
    Row,
}

impl Orientation {
    /// Axis `(u, v)` to panel `(x, y)`.
    pub fn to_panel(&self, u: f64, v: f64) -> (f64, f64) {
        match self {
            Orientation::Column => (u, v),
            Orientation::Row => (v, u),
        }
    }

    /// Panel `(x, y)` back to axis `(u, v)`. The swap is its own inverse.
    pub fn to_axis(&self, x: f64, y: f64) -> (f64, f64) {
        self.to_panel(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MergeStep;

    fn axis(merges: Vec<(i32, i32)>, heights: Vec<f64>, n: usize) -> AxisClustering {
        AxisClustering {
            merges: merges.into_iter().map(|(n1, n2)| MergeStep { n1, n2 }).collect(),
            heights,
            labels: (0..n).map(|i| format!("L{}", i + 1)).collect(),
            order: (0..n).collect(),
        }
    }

    fn four_leaf_axis() -> AxisClustering {
        axis(vec![(-1, -2), (-3, -4), (1, 2)], vec![0.5, 1.0, 2.0], 4)
    }

    #[test]
    fn one_polyline_per_merge_inside_the_panel() {
        let layout = layout_axis(&four_leaf_axis(), 80.0, 10.0).unwrap();
        assert_eq!(layout.polylines.len(), 3);
        assert_eq!(layout.clusters.len(), 3);
        for poly in &layout.polylines {
            for (ua, va, ub, vb) in poly.segments() {
                for v in [va, vb] {
                    assert!((0.0..=80.0).contains(&v), "v {} outside panel", v);
                }
                for u in [ua, ub] {
                    assert!((0.0..=40.0).contains(&u), "u {} outside panel", u);
                }
            }
        }
    }

    #[test]
    fn leaves_sit_at_slot_centers_in_order() {
        let mut axis = axis(vec![(-1, -2), (1, -3)], vec![1.0, 2.0], 3);
        axis.order = vec![2, 0, 1];
        let layout = layout_axis(&axis, 80.0, 10.0).unwrap();
        assert_eq!(layout.leaf_positions[2].u, 5.0);
        assert_eq!(layout.leaf_positions[0].u, 15.0);
        assert_eq!(layout.leaf_positions[1].u, 25.0);
        let by_slot: Vec<f64> = axis.order.iter().map(|&i| layout.leaf_positions[i].u).collect();
        assert!(by_slot.windows(2).all(|w| w[0] < w[1]));
        for p in &layout.leaf_positions {
            assert_eq!(p.v, 80.0);
        }
    }

    #[test]
    fn tallest_merge_touches_the_top_exactly() {
        let layout = layout_axis(&four_leaf_axis(), 80.0, 10.0).unwrap();
        assert_eq!(layout.clusters[&3].position.v, 0.0);
        assert_eq!(layout.clusters[&1].position.v, 60.0);
        assert_eq!(layout.clusters[&2].position.v, 40.0);
    }

    #[test]
    fn junction_sits_at_child_midpoint() {
        let layout = layout_axis(&four_leaf_axis(), 80.0, 10.0).unwrap();
        assert_eq!(layout.clusters[&1].position.u, 10.0);
        assert_eq!(layout.clusters[&2].position.u, 30.0);
        assert_eq!(layout.clusters[&3].position.u, 20.0);
    }

    #[test]
    fn merged_leaves_and_children_accumulate() {
        let layout = layout_axis(&four_leaf_axis(), 80.0, 10.0).unwrap();
        assert_eq!(layout.clusters[&1].leaves, vec![0, 1]);
        assert_eq!(layout.clusters[&3].leaves, vec![0, 1, 2, 3]);
        assert!(layout.clusters[&1].child_cluster_ids.is_empty());
        assert_eq!(layout.clusters[&3].child_cluster_ids, vec![1, 2]);
    }

    #[test]
    fn layout_is_deterministic() {
        let axis = four_leaf_axis();
        let a = layout_axis(&axis, 80.0, 10.0).unwrap();
        let b = layout_axis(&axis, 80.0, 10.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn equal_heights_share_one_junction_line() {
        let axis = axis(vec![(-1, -2), (1, -3)], vec![1.0, 1.0], 3);
        let layout = layout_axis(&axis, 80.0, 10.0).unwrap();
        assert_eq!(layout.clusters[&1].position.v, 0.0);
        assert_eq!(layout.clusters[&2].position.v, 0.0);
    }

    #[test]
    fn zero_heights_stay_flat_at_the_leaf_line() {
        let axis = axis(vec![(-1, -2), (1, -3)], vec![0.0, 0.0], 3);
        let layout = layout_axis(&axis, 80.0, 10.0).unwrap();
        assert_eq!(layout.clusters[&1].position.v, 80.0);
        assert_eq!(layout.clusters[&2].position.v, 80.0);
    }

    #[test]
    fn no_merges_means_no_polylines() {
        let layout = layout_axis(&axis(vec![], vec![], 1), 80.0, 10.0).unwrap();
        assert_eq!(layout.leaf_count, 1);
        assert!(layout.polylines.is_empty());
        assert!(layout.clusters.is_empty());

        let layout = layout_axis(&axis(vec![], vec![], 0), 80.0, 10.0).unwrap();
        assert_eq!(layout.leaf_count, 0);
        assert!(layout.clusters.is_empty());
    }

    #[test]
    fn mismatched_heights_are_rejected() {
        let bad = axis(vec![(-1, -2)], vec![], 2);
        let err = layout_axis(&bad, 80.0, 10.0).unwrap_err().to_string();
        assert!(err.contains("carry 0 heights"), "{}", err);
    }

    #[test]
    fn zero_reference_is_rejected() {
        let axis = axis(vec![(0, -1)], vec![1.0], 2);
        let err = layout_axis(&axis, 80.0, 10.0).unwrap_err().to_string();
        assert!(err.contains("reference 0"), "{}", err);
    }

    #[test]
    fn forward_reference_is_rejected() {
        let axis = axis(vec![(2, -1), (-2, -3)], vec![1.0, 2.0], 3);
        let err = layout_axis(&axis, 80.0, 10.0).unwrap_err().to_string();
        assert!(err.contains("before it is formed"), "{}", err);
    }

    #[test]
    fn self_reference_is_rejected() {
        let axis = axis(vec![(-1, -2), (2, -3)], vec![1.0, 2.0], 3);
        let err = layout_axis(&axis, 80.0, 10.0).unwrap_err().to_string();
        assert!(err.contains("before it is formed"), "{}", err);
    }

    #[test]
    fn out_of_range_leaf_is_rejected() {
        let axis = axis(vec![(-1, -5)], vec![1.0], 2);
        let err = layout_axis(&axis, 80.0, 10.0).unwrap_err().to_string();
        assert!(err.contains("exceeds 2 leaves"), "{}", err);
    }

    #[test]
    fn descendants_walk_the_whole_subtree() {
        let layout = layout_axis(&four_leaf_axis(), 80.0, 10.0).unwrap();
        let mut under_root = descendants(&layout, 3);
        under_root.sort();
        assert_eq!(under_root, vec![1, 2]);
        assert!(descendants(&layout, 1).is_empty());

        let nested = axis(vec![(-1, -2), (1, -3)], vec![1.0, 2.0], 3);
        let layout = layout_axis(&nested, 80.0, 10.0).unwrap();
        assert_eq!(descendants(&layout, 2), vec![1]);
    }

    #[test]
    fn orientation_swap_is_its_own_inverse() {
        for orient in [Orientation::Column, Orientation::Row] {
            let (x, y) = orient.to_panel(3.0, 7.0);
            assert_eq!(orient.to_axis(x, y), (3.0, 7.0));
        }
        assert_eq!(Orientation::Column.to_panel(3.0, 7.0), (3.0, 7.0));
        assert_eq!(Orientation::Row.to_panel(3.0, 7.0), (7.0, 3.0));
    }
}
