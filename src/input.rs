use anyhow::{bail, Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One agglomeration event in hclust merge encoding: a negative value names
/// the leaf with 0-based input index `-n - 1`, a positive value names the
/// cluster formed by that (1-based) earlier merge step. Zero is malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStep {
    pub n1: i32,
    pub n2: i32,
}

/// The two dendrogram orientations of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

impl Axis {
    fn parse(field: &str) -> Option<Axis> {
        match field {
            "row" => Some(Axis::Row),
            "col" => Some(Axis::Col),
            _ => None,
        }
    }
}

/// Clustering output for one axis: the merge list with its heights, leaf
/// labels in input order, and the display-order permutation.
#[derive(Debug, Clone, Default)]
pub struct AxisClustering {
    pub merges: Vec<MergeStep>,
    pub heights: Vec<f64>,
    /// Leaf labels, input order.
    pub labels: Vec<String>,
    /// Display slot -> 0-based leaf input index (the hclust `order` vector).
    pub order: Vec<usize>,
}

impl AxisClustering {
    pub fn leaf_count(&self) -> usize {
        self.labels.len()
    }

    /// Labels in display order.
    pub fn display_labels(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.labels[i].as_str()).collect()
    }
}

/// Full parsed input: clustering for both axes plus the value matrix,
/// `values[row_input_index][col_input_index]`.
#[derive(Debug, Clone)]
pub struct ClusterData {
    pub row: AxisClustering,
    pub col: AxisClustering,
    pub values: Vec<Vec<f64>>,
}

/// Parse a clustering file.
pub fn parse_cluster_file(path: &Path) -> Result<ClusterData> {
    info!("Loading clustering file...");
    let file = File::open(path).with_context(|| format!("cannot open {:?}", path))?;
    parse_cluster_reader(BufReader::new(file))
}

/// Parse the line-tagged clustering format from any reader.
///
/// Records are tab-separated with a one-letter tag: `L` (leaf label, input
/// order), `M` (merge step `n1 n2 height`), `O` (display order, comma
/// separated 1-based input indices), `V` (matrix values for one row, column
/// input order). Lines starting with `#` and unknown tags are skipped.
pub fn parse_cluster_reader<R: BufRead>(reader: R) -> Result<ClusterData> {
    let mut row = AxisClustering::default();
    let mut col = AxisClustering::default();
    let mut value_rows: FxHashMap<usize, Vec<f64>> = FxHashMap::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = idx + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        match parts[0] {
            "L" => {
                if parts.len() < 3 {
                    bail!("line {}: L record needs an axis and a label", lineno);
                }
                let axis = axis_field(parts[1], lineno)?;
                axis_mut(&mut row, &mut col, axis).labels.push(parts[2].to_string());
            }
            "M" => {
                if parts.len() < 5 {
                    bail!("line {}: M record needs an axis, two references and a height", lineno);
                }
                let axis = axis_field(parts[1], lineno)?;
                let n1 = ref_field(parts[2], lineno)?;
                let n2 = ref_field(parts[3], lineno)?;
                let height: f64 = parts[4]
                    .parse()
                    .with_context(|| format!("line {}: invalid height {:?}", lineno, parts[4]))?;
                if !height.is_finite() || height < 0.0 {
                    bail!("line {}: merge height must be a non-negative number", lineno);
                }
                let target = axis_mut(&mut row, &mut col, axis);
                target.merges.push(MergeStep { n1, n2 });
                target.heights.push(height);
            }
            "O" => {
                if parts.len() < 3 {
                    bail!("line {}: O record needs an axis and an index list", lineno);
                }
                let axis = axis_field(parts[1], lineno)?;
                let target = axis_mut(&mut row, &mut col, axis);
                if !target.order.is_empty() {
                    bail!("line {}: duplicate O record for the {} axis", lineno, parts[1]);
                }
                for field in parts[2].split(',') {
                    let field = field.trim();
                    if field.is_empty() {
                        continue;
                    }
                    let one_based: usize = field
                        .parse()
                        .with_context(|| format!("line {}: invalid order index {:?}", lineno, field))?;
                    if one_based == 0 {
                        bail!("line {}: order indices are 1-based, got 0", lineno);
                    }
                    target.order.push(one_based - 1);
                }
            }
            "V" => {
                if parts.len() < 3 {
                    bail!("line {}: V record needs a row index and a value list", lineno);
                }
                let one_based: usize = parts[1]
                    .parse()
                    .with_context(|| format!("line {}: invalid row index {:?}", lineno, parts[1]))?;
                if one_based == 0 {
                    bail!("line {}: row indices are 1-based, got 0", lineno);
                }
                let mut values = Vec::new();
                for field in parts[2].split(',') {
                    let field = field.trim();
                    if field.is_empty() {
                        continue;
                    }
                    let v: f64 = field
                        .parse()
                        .with_context(|| format!("line {}: invalid value {:?}", lineno, field))?;
                    values.push(v);
                }
                if value_rows.insert(one_based - 1, values).is_some() {
                    bail!("line {}: duplicate V record for row {}", lineno, one_based);
                }
            }
            _ => {} // unknown record types are skipped
        }
    }

    validate_axis(&row, "row")?;
    validate_axis(&col, "col")?;

    let values = collect_values(value_rows, row.leaf_count(), col.leaf_count())?;

    info!(
        "Found {} rows x {} cols, {} + {} merge steps",
        row.leaf_count(),
        col.leaf_count(),
        row.merges.len(),
        col.merges.len()
    );

    Ok(ClusterData { row, col, values })
}

fn axis_field(field: &str, lineno: usize) -> Result<Axis> {
    Axis::parse(field).with_context(|| format!("line {}: unknown axis {:?}", lineno, field))
}

fn axis_mut<'a>(row: &'a mut AxisClustering, col: &'a mut AxisClustering, axis: Axis) -> &'a mut AxisClustering {
    match axis {
        Axis::Row => row,
        Axis::Col => col,
    }
}

fn ref_field(field: &str, lineno: usize) -> Result<i32> {
    field
        .parse()
        .with_context(|| format!("line {}: invalid merge reference {:?}", lineno, field))
}

/// Shape checks for one axis: merge count against leaf count, and the
/// display order being a full permutation of the leaves.
fn validate_axis(axis: &AxisClustering, name: &str) -> Result<()> {
    let n = axis.leaf_count();
    let k = axis.merges.len();
    if k > 0 && n != k + 1 {
        bail!("{} axis: {} merge steps require {} leaves, found {}", name, k, k + 1, n);
    }
    if axis.order.len() != n {
        bail!("{} axis: display order covers {} of {} leaves", name, axis.order.len(), n);
    }
    let mut seen = vec![false; n];
    for &input in &axis.order {
        if input >= n {
            bail!("{} axis: order index {} exceeds {} leaves", name, input + 1, n);
        }
        if seen[input] {
            bail!("{} axis: order index {} appears twice", name, input + 1);
        }
        seen[input] = true;
    }
    debug!("{} axis: {} leaves, {} merge steps", name, n, k);
    Ok(())
}

/// Assemble V records into a dense matrix in row input order.
fn collect_values(
    mut value_rows: FxHashMap<usize, Vec<f64>>,
    row_count: usize,
    col_count: usize,
) -> Result<Vec<Vec<f64>>> {
    let mut values = Vec::with_capacity(row_count);
    for input in 0..row_count {
        let row = value_rows
            .remove(&input)
            .with_context(|| format!("missing V record for row {}", input + 1))?;
        if row.len() != col_count {
            bail!("V record for row {} has {} values, expected {}", input + 1, row.len(), col_count);
        }
        values.push(row);
    }
    if let Some(&extra) = value_rows.keys().next() {
        bail!("V record for row {} exceeds {} row leaves", extra + 1, row_count);
    }
    Ok(values)
}

/// Z-score each row in place (mean 0, sd 1); rows with zero spread become
/// all zeros rather than dividing by zero.
pub fn zscore_rows(values: &mut [Vec<f64>]) {
    values.par_iter_mut().for_each(|row| {
        if row.is_empty() {
            return;
        }
        let n = row.len() as f64;
        let mean = row.iter().sum::<f64>() / n;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let sd = var.sqrt();
        for v in row.iter_mut() {
            *v = if sd > 0.0 { (*v - mean) / sd } else { 0.0 };
        }
    });
}
