//! Cluster picking and selection. A pick runs against the retained layout,
//! never against pixels, so it works even while a newer frame is still
//! encoding.

use log::info;
use rustc_hash::FxHashSet;
use std::path::Path;

use crate::input::AxisClustering;
use crate::layout::{descendants, DendrogramLayout, Orientation};

/// Pointer slack around a stroke, CSS pixels on each side.
pub const HIT_TOLERANCE: f64 = 5.0;

fn near_segment(u: f64, v: f64, ua: f64, va: f64, ub: f64, vb: f64) -> bool {
    u >= ua.min(ub) - HIT_TOLERANCE
        && u <= ua.max(ub) + HIT_TOLERANCE
        && v >= va.min(vb) - HIT_TOLERANCE
        && v <= va.max(vb) + HIT_TOLERANCE
}

/// Find the cluster whose connector passes within tolerance of an axis-space
/// point. Ties go to the earliest merge step, so repeated picks at one point
/// always name the same cluster.
pub fn pick(layout: &DendrogramLayout, u: f64, v: f64) -> Option<u32> {
    for poly in &layout.polylines {
        for (ua, va, ub, vb) in poly.segments() {
            if near_segment(u, v, ua, va, ub, vb) {
                return Some(poly.cluster_id);
            }
        }
    }
    None
}

/// Pick from panel coordinates, undoing the orientation swap first.
pub fn pick_at_panel(layout: &DendrogramLayout, orientation: Orientation, x: f64, y: f64) -> Option<u32> {
    let (u, v) = orientation.to_axis(x, y);
    pick(layout, u, v)
}

/// Selecting a cluster selects its whole subtree. Returns the picked ids
/// followed by their descendants, each id once, in first-seen order.
pub fn expand_selection(layout: &DendrogramLayout, ids: &[u32]) -> Vec<u32> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for &id in ids {
        if layout.clusters.contains_key(&id) && seen.insert(id) {
            out.push(id);
            for child in descendants(layout, id) {
                if seen.insert(child) {
                    out.push(child);
                }
            }
        }
    }
    out
}

/// Append one line per leaf per selected cluster, labels resolved through
/// the clustering input order.
pub fn push_members(content: &mut String, axis_name: &str, layout: &DendrogramLayout, axis: &AxisClustering, ids: &[u32]) {
    for &id in ids {
        if let Some(cluster) = layout.clusters.get(&id) {
            for &input in &cluster.leaves {
                content.push_str(&format!("{}\t{}\t{}\n", axis_name, id, axis.labels[input]));
            }
        }
    }
}

pub fn members_header() -> String {
    String::from("axis\tcluster\tleaf\n")
}

/// Write the selection next to the image output.
pub fn write_members_tsv(out: &Path, content: &str) {
    let tsv_path = out.with_extension("members.tsv");
    match std::fs::write(&tsv_path, content) {
        Ok(_) => info!("Cluster members saved to {:?}", tsv_path),
        Err(e) => eprintln!("Warning: could not write members TSV: {}", e),
    }
}
