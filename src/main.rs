use clap::Parser;
use log::{debug, info};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

mod compose;
mod input;
mod layout;
mod pick;
mod raster;
mod svg;

use compose::{assemble, Compositor};
use input::{parse_cluster_file, zscore_rows, AxisClustering};
use layout::{layout_axis, DendrogramLayout, Orientation};
use pick::{expand_selection, members_header, pick_at_panel, push_members, write_members_tsv};
use raster::{
    dev, draw_col_labels, draw_dendrogram, draw_heatmap, draw_row_labels, Palette, ValueScale,
};

#[derive(Parser)]
#[command(name = "dendrolook")]
#[command(about = "Visualize a hierarchically clustered matrix.", long_about = None)]
struct Args {
    // MANDATORY OPTIONS
    /// Load the clustering output in TSV format from this FILE.
    #[arg(short = 'i', long = "idx", value_name = "FILE")]
    idx: PathBuf,

    /// Write the visualization to this FILE (PNG or SVG based on extension).
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: PathBuf,

    // Visualization Options
    /// Edge length in pixels of one matrix cell.
    #[arg(short = 's', long = "cell-size", value_name = "N", default_value_t = 12)]
    cell_size: u32,

    /// Depth in pixels of each dendrogram panel.
    #[arg(short = 'a', long = "dendro-extent", value_name = "N", default_value_t = 80)]
    dendro_extent: u32,

    /// Device pixel ratio applied to the raster output.
    #[arg(short = 'f', long = "scale-factor", value_name = "FLOAT", default_value_t = 1.0)]
    scale_factor: f64,

    /// Z-score each row before coloring.
    #[arg(short = 'Z', long = "scale-rows")]
    scale_rows: bool,

    /// Cell color palette (diverging or spectral).
    #[arg(short = 'P', long = "palette", value_name = "NAME", default_value = "diverging")]
    palette: String,

    // Selection Options
    /// Highlight these row clusters and their subtrees (comma separated ids).
    #[arg(long = "highlight-row", value_name = "IDS")]
    highlight_row: Option<String>,

    /// Highlight these column clusters and their subtrees (comma separated ids).
    #[arg(long = "highlight-col", value_name = "IDS")]
    highlight_col: Option<String>,

    /// Report the row cluster under this point of the row dendrogram panel.
    #[arg(long = "pick-row", value_name = "X,Y")]
    pick_row: Option<String>,

    /// Report the column cluster under this point of the column dendrogram panel.
    #[arg(long = "pick-col", value_name = "X,Y")]
    pick_col: Option<String>,

    // Label Viz Options
    /// Hide the leaf labels.
    #[arg(short = 'H', long = "hide-labels")]
    hide_labels: bool,

    /// Color label backgrounds by leaf name.
    #[arg(short = 'C', long = "color-label-background")]
    color_label_background: bool,

    /// Maximum number of characters to display for each label.
    #[arg(short = 'c', long = "max-num-of-characters", value_name = "N")]
    max_num_of_characters: Option<usize>,

    // Threading
    /// Number of threads to use for parallel operations.
    #[arg(short = 't', long = "threads", value_name = "N")]
    threads: Option<usize>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1)]
    verbose: u8,
}

fn parse_id_list(text: &str) -> Option<Vec<u32>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

fn parse_point(text: &str) -> Option<(f64, f64)> {
    let (x, y) = text.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Expand a `--highlight-*` id list to the full selection, warning about
/// ids that name no cluster.
fn build_selection(arg: &str, axis_name: &str, layout: &DendrogramLayout) -> Vec<u32> {
    let ids = match parse_id_list(arg) {
        Some(ids) => ids,
        None => {
            eprintln!("Error: invalid cluster id list {:?}", arg);
            std::process::exit(1);
        }
    };
    for &id in &ids {
        if !layout.clusters.contains_key(&id) {
            eprintln!("Warning: no {} cluster {}", axis_name, id);
        }
    }
    expand_selection(layout, &ids)
}

fn report_pick(
    arg: &str,
    axis_name: &str,
    layout: &DendrogramLayout,
    axis: &AxisClustering,
    orientation: Orientation,
) {
    let (x, y) = match parse_point(arg) {
        Some(p) => p,
        None => {
            eprintln!("Error: invalid pick point {:?} (expected X,Y)", arg);
            std::process::exit(1);
        }
    };
    let hit = pick_at_panel(layout, orientation, x, y)
        .and_then(|id| layout.clusters.get(&id).map(|cluster| (id, cluster)));
    match hit {
        Some((id, cluster)) => {
            let leaves: Vec<&str> = cluster
                .leaves
                .iter()
                .map(|&input| axis.labels[input].as_str())
                .collect();
            println!("{}\t{}\t{}", axis_name, id, leaves.join(","));
        }
        None => println!("{}\t-", axis_name),
    }
}

fn max_label_chars(labels: &[&str], cap: Option<usize>) -> usize {
    let longest = labels.iter().map(|n| n.chars().count()).max().unwrap_or(10);
    cap.unwrap_or(longest.min(128))
}

fn layout_or_exit(axis: &AxisClustering, axis_name: &str, extent: f64, cell: f64) -> DendrogramLayout {
    match layout_axis(axis, extent, cell) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("Error in {} clustering: {:#}", axis_name, e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            eprintln!("Warning: could not size the thread pool: {}", e);
        }
    }

    if args.cell_size == 0 {
        eprintln!("Error: --cell-size must be positive.");
        std::process::exit(1);
    }
    if !(args.scale_factor > 0.0) {
        eprintln!("Error: --scale-factor must be positive.");
        std::process::exit(1);
    }
    let palette = match args.palette.as_str() {
        "diverging" => Palette::Diverging,
        "spectral" => Palette::Spectral,
        other => {
            eprintln!("Error: unknown palette {:?} (expected diverging or spectral).", other);
            std::process::exit(1);
        }
    };

    info!("Starting visualization...");

    let data = match parse_cluster_file(&args.idx) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error loading clustering file: {:#}", e);
            std::process::exit(1);
        }
    };

    let cell = args.cell_size as f64;
    let extent = args.dendro_extent as f64;
    let dpr = args.scale_factor;

    let row_layout = layout_or_exit(&data.row, "row", extent, cell);
    let col_layout = layout_or_exit(&data.col, "column", extent, cell);

    if let Some(ref arg) = args.pick_row {
        report_pick(arg, "row", &row_layout, &data.row, Orientation::Row);
    }
    if let Some(ref arg) = args.pick_col {
        report_pick(arg, "col", &col_layout, &data.col, Orientation::Column);
    }

    let row_selection = args
        .highlight_row
        .as_deref()
        .map(|arg| build_selection(arg, "row", &row_layout))
        .unwrap_or_default();
    let col_selection = args
        .highlight_col
        .as_deref()
        .map(|arg| build_selection(arg, "column", &col_layout))
        .unwrap_or_default();
    let row_highlight: FxHashSet<u32> = row_selection.iter().copied().collect();
    let col_highlight: FxHashSet<u32> = col_selection.iter().copied().collect();

    if data.row.leaf_count() == 0 || data.col.leaf_count() == 0 {
        eprintln!("Warning: the matrix is empty, nothing to draw.");
        return;
    }

    let mut values = data.values.clone();
    if args.scale_rows {
        debug!("Z-scoring {} rows", values.len());
        zscore_rows(&mut values);
    }
    let scale = ValueScale::from_values(&values, palette, args.scale_rows);

    // Detect output format by file extension
    let is_svg = args
        .out
        .extension()
        .map(|ext| ext.to_ascii_lowercase() == "svg")
        .unwrap_or(false);

    if is_svg {
        info!("Rendering SVG...");

        let scene = svg::SvgScene {
            data: &data,
            values: &values,
            row_layout: &row_layout,
            col_layout: &col_layout,
            scale,
            row_highlight: &row_highlight,
            col_highlight: &col_highlight,
            cell,
            hide_labels: args.hide_labels,
            color_label_background: args.color_label_background,
        };
        let svg_content = svg::render(&scene);

        info!("Saving to {:?}...", args.out);

        let mut file = match File::create(&args.out) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error creating file: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = file.write_all(svg_content.as_bytes()) {
            eprintln!("Error writing SVG: {}", e);
            std::process::exit(1);
        }
    } else {
        info!("Rendering image...");

        let heat = draw_heatmap(&data.row.order, &data.col.order, &values, &scale, cell, dpr);
        let row_dendro = (!row_layout.polylines.is_empty())
            .then(|| draw_dendrogram(&row_layout, Orientation::Row, &row_highlight, dpr));
        let col_dendro = (!col_layout.polylines.is_empty())
            .then(|| draw_dendrogram(&col_layout, Orientation::Column, &col_highlight, dpr));

        // bitmap labels need at least one 8px glyph per cell
        let show_labels = !args.hide_labels && dev(cell, dpr) >= 8;
        let row_label_panel = show_labels.then(|| {
            let labels = data.row.display_labels();
            let max_chars = max_label_chars(&labels, args.max_num_of_characters);
            draw_row_labels(&labels, cell, dpr, max_chars, args.color_label_background)
        });
        let col_label_panel = show_labels.then(|| {
            let labels = data.col.display_labels();
            let max_chars = max_label_chars(&labels, args.max_num_of_characters);
            draw_col_labels(&labels, cell, dpr, max_chars, args.color_label_background)
        });

        let canvas = assemble(
            &heat,
            row_dendro.as_ref(),
            col_dendro.as_ref(),
            row_label_panel.as_ref(),
            col_label_panel.as_ref(),
        );

        let mut compositor = Compositor::new();
        compositor.submit(1, &canvas);
        let frame = match compositor.frame() {
            Some(f) => f,
            None => {
                eprintln!("Error: no frame could be encoded.");
                std::process::exit(1);
            }
        };

        info!("Saving {}x{} frame to {:?}...", frame.width, frame.height, args.out);

        if let Err(e) = std::fs::write(&args.out, &frame.png) {
            eprintln!("Error saving image: {}", e);
            std::process::exit(1);
        }
    }

    if !row_selection.is_empty() || !col_selection.is_empty() {
        let mut content = members_header();
        push_members(&mut content, "row", &row_layout, &data.row, &row_selection);
        push_members(&mut content, "col", &col_layout, &data.col, &col_selection);
        write_members_tsv(&args.out, &content);
    }

    info!("Done.");
}
