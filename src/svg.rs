//! SVG rendering with vector fonts. Unlike the raster path this keeps full
//! label text, so it is the format of choice for figures.

use rustc_hash::FxHashSet;

use crate::input::ClusterData;
use crate::layout::{DendrogramLayout, Orientation};
use crate::raster::{ValueScale, ACCENT};

/// Escape special XML characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Everything one SVG render needs, borrowed from the caller.
pub struct SvgScene<'a> {
    pub data: &'a ClusterData,
    /// Matrix to color, `[row input][col input]`. May differ from the raw
    /// input when rows were rescaled.
    pub values: &'a [Vec<f64>],
    pub row_layout: &'a DendrogramLayout,
    pub col_layout: &'a DendrogramLayout,
    pub scale: ValueScale,
    pub row_highlight: &'a FxHashSet<u32>,
    pub col_highlight: &'a FxHashSet<u32>,
    /// Cell edge in CSS pixels.
    pub cell: f64,
    pub hide_labels: bool,
    pub color_label_background: bool,
}

pub fn render(scene: &SvgScene) -> String {
    let row_n = scene.data.row.leaf_count();
    let col_n = scene.data.col.leaf_count();
    let heat_w = scene.cell * col_n as f64;
    let heat_h = scene.cell * row_n as f64;

    let left = if scene.row_layout.polylines.is_empty() {
        0.0
    } else {
        scene.row_layout.axis_height
    };
    let top = if scene.col_layout.polylines.is_empty() {
        0.0
    } else {
        scene.col_layout.axis_height
    };

    let font_size = (scene.cell * 0.8).max(8.0);
    let char_width = font_size * 0.6; // approximate monospace advance
    let row_labels = scene.data.row.display_labels();
    let col_labels = scene.data.col.display_labels();
    let text_width = if scene.hide_labels {
        0.0
    } else {
        let max_len = row_labels.iter().map(|n| n.chars().count()).max().unwrap_or(0);
        max_len as f64 * char_width + 10.0
    };
    let text_height = if scene.hide_labels {
        0.0
    } else {
        let max_len = col_labels.iter().map(|n| n.chars().count()).max().unwrap_or(0);
        max_len as f64 * char_width + 10.0
    };

    let total_width = left + heat_w + text_width;
    let total_height = top + heat_h + text_height;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
  .leaf-label {{ font-family: 'DejaVu Sans Mono', 'Courier New', monospace; font-size: {}px; }}
</style>
<rect width="100%" height="100%" fill="white"/>
"#,
        total_width, total_height, total_width, total_height, font_size
    ));

    // Heatmap cells, merging consecutive same-color cells into one rect
    for (row_slot, &row_input) in scene.data.row.order.iter().enumerate() {
        let y = top + row_slot as f64 * scene.cell;
        let mut run_start = 0usize;
        let mut run_color: Option<(u8, u8, u8)> = None;
        for (col_slot, &col_input) in scene.data.col.order.iter().enumerate() {
            let color = scene.scale.color(scene.values[row_input][col_input]);
            match run_color {
                Some(current) if current == color => {}
                Some(current) => {
                    push_cell_run(&mut svg, left, y, run_start, col_slot, scene.cell, current);
                    run_start = col_slot;
                    run_color = Some(color);
                }
                None => run_color = Some(color),
            }
        }
        if let Some(current) = run_color {
            push_cell_run(&mut svg, left, y, run_start, col_n, scene.cell, current);
        }
    }

    push_dendrogram(&mut svg, scene.col_layout, Orientation::Column, left, 0.0, scene.col_highlight);
    push_dendrogram(&mut svg, scene.row_layout, Orientation::Row, 0.0, top, scene.row_highlight);

    if !scene.hide_labels {
        for (slot, name) in row_labels.iter().enumerate() {
            let y_start = top + slot as f64 * scene.cell;
            let text_y = y_start + scene.cell / 2.0 + font_size / 3.0;
            let text_color = if scene.color_label_background {
                let (r, g, b) = crate::raster::label_color(name);
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="rgb({},{},{})"/>"#,
                    left + heat_w, y_start, text_width, scene.cell, r, g, b
                ));
                svg.push('\n');
                "white"
            } else {
                "black"
            };
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" class="leaf-label" fill="{}">{}</text>"#,
                left + heat_w + 5.0,
                text_y,
                text_color,
                escape_xml(name)
            ));
            svg.push('\n');
        }
        for (slot, name) in col_labels.iter().enumerate() {
            let x_start = left + slot as f64 * scene.cell;
            let text_x = x_start + scene.cell / 2.0 + font_size / 3.0;
            let text_color = if scene.color_label_background {
                let (r, g, b) = crate::raster::label_color(name);
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="rgb({},{},{})"/>"#,
                    x_start, top + heat_h, scene.cell, text_height, r, g, b
                ));
                svg.push('\n');
                "white"
            } else {
                "black"
            };
            svg.push_str(&format!(
                r#"<text transform="translate({},{}) rotate(90)" class="leaf-label" fill="{}">{}</text>"#,
                text_x,
                top + heat_h + 5.0,
                text_color,
                escape_xml(name)
            ));
            svg.push('\n');
        }
    }

    svg.push_str("</svg>\n");
    svg
}

fn push_cell_run(svg: &mut String, left: f64, y: f64, start_slot: usize, end_slot: usize, cell: f64, color: (u8, u8, u8)) {
    let x = left + start_slot as f64 * cell;
    let width = (end_slot - start_slot) as f64 * cell;
    svg.push_str(&format!(
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="rgb({},{},{})"/>"#,
        x, y, width, cell, color.0, color.1, color.2
    ));
    svg.push('\n');
}

/// U-shaped connectors as SVG paths, highlighted ones last so the accent
/// stays on top.
fn push_dendrogram(
    svg: &mut String,
    layout: &DendrogramLayout,
    orientation: Orientation,
    dx: f64,
    dy: f64,
    highlight: &FxHashSet<u32>,
) {
    for accent_pass in [false, true] {
        for poly in &layout.polylines {
            let accented = highlight.contains(&poly.cluster_id);
            if accented != accent_pass {
                continue;
            }
            let stroke = if accented {
                format!("rgb({},{},{})", ACCENT.0, ACCENT.1, ACCENT.2)
            } else {
                "black".to_string()
            };
            let (x1, y1) = orientation.to_panel(poly.u1, poly.v1);
            let (xa, ya) = orientation.to_panel(poly.u1, poly.junction_v);
            let (xb, yb) = orientation.to_panel(poly.u2, poly.junction_v);
            let (x2, y2) = orientation.to_panel(poly.u2, poly.v2);
            svg.push_str(&format!(
                r#"<path d="M{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1} L{:.1},{:.1}" fill="none" stroke="{}" stroke-width="1"/>"#,
                dx + x1,
                dy + y1,
                dx + xa,
                dy + ya,
                dx + xb,
                dy + yb,
                dx + x2,
                dy + y2,
                stroke
            ));
            svg.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{parse_cluster_reader, ClusterData};
    use crate::layout::layout_axis;
    use crate::raster::Palette;
    use std::io::Cursor;

    fn sample_data() -> ClusterData {
        let text = "\
L\trow\tgene<1>
L\trow\tgeneB
M\trow\t-1\t-2\t1.0
O\trow\t1,2
L\tcol\ts1
L\tcol\ts2
L\tcol\ts3
M\tcol\t-1\t-2\t0.5
M\tcol\t1\t-3\t1.0
O\tcol\t1,2,3
V\t1\t1.0,1.0,-1.0
V\t2\t1.0,1.0,-1.0
";
        parse_cluster_reader(Cursor::new(text)).unwrap()
    }

    fn scene_of<'a>(
        data: &'a ClusterData,
        row_layout: &'a DendrogramLayout,
        col_layout: &'a DendrogramLayout,
        highlight: &'a FxHashSet<u32>,
        hide_labels: bool,
    ) -> SvgScene<'a> {
        SvgScene {
            data,
            values: &data.values,
            row_layout,
            col_layout,
            scale: ValueScale {
                lo: -1.0,
                hi: 1.0,
                palette: Palette::Diverging,
            },
            row_highlight: highlight,
            col_highlight: highlight,
            cell: 10.0,
            hide_labels,
            color_label_background: false,
        }
    }

    #[test]
    fn escapes_xml_metacharacters() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }

    #[test]
    fn document_frame_covers_all_panels() {
        let data = sample_data();
        let row_layout = layout_axis(&data.row, 40.0, 10.0).unwrap();
        let col_layout = layout_axis(&data.col, 40.0, 10.0).unwrap();
        let empty = FxHashSet::default();
        let svg = render(&scene_of(&data, &row_layout, &col_layout, &empty, true));
        // 40 dendrogram + 3 * 10 cells, 40 + 2 * 10
        assert!(svg.contains(r#"viewBox="0 0 70 60""#), "{}", svg);
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn same_color_cells_merge_into_one_rect() {
        let data = sample_data();
        let row_layout = layout_axis(&data.row, 40.0, 10.0).unwrap();
        let col_layout = layout_axis(&data.col, 40.0, 10.0).unwrap();
        let empty = FxHashSet::default();
        let svg = render(&scene_of(&data, &row_layout, &col_layout, &empty, true));
        // 2 runs per row and the background rect
        assert_eq!(svg.matches("<rect").count(), 2 * 2 + 1);
        assert!(svg.contains(r#"width="20""#));
    }

    #[test]
    fn highlight_switches_the_stroke_color() {
        let data = sample_data();
        let row_layout = layout_axis(&data.row, 40.0, 10.0).unwrap();
        let col_layout = layout_axis(&data.col, 40.0, 10.0).unwrap();
        let mut highlight = FxHashSet::default();
        highlight.insert(1u32);
        let svg = render(&scene_of(&data, &row_layout, &col_layout, &highlight, true));
        assert!(svg.contains(r#"stroke="rgb(228,26,28)""#));
        assert!(svg.contains(r#"stroke="black""#));
    }

    #[test]
    fn labels_render_escaped_and_rotated() {
        let data = sample_data();
        let row_layout = layout_axis(&data.row, 40.0, 10.0).unwrap();
        let col_layout = layout_axis(&data.col, 40.0, 10.0).unwrap();
        let empty = FxHashSet::default();
        let svg = render(&scene_of(&data, &row_layout, &col_layout, &empty, false));
        assert!(svg.contains("gene&lt;1&gt;"));
        assert!(svg.contains("rotate(90)"));
        let hidden = render(&scene_of(&data, &row_layout, &col_layout, &empty, true));
        assert!(!hidden.contains("<text"));
    }
}
