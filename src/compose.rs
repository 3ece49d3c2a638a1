//! Panel assembly and frame publication. Rendering produces a full
//! replacement frame; the compositor swaps it in only once the PNG encode
//! has succeeded, so a failed or out-of-date render never tears down the
//! last good image.

use anyhow::{Context, Result};
use log::debug;
use std::io::Cursor;

use crate::raster::Pixmap;

/// An encoded frame ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Holds the last successfully encoded frame. Render passes carry a
/// monotonically increasing number; a pass older than the newest one seen
/// is dropped so late results cannot overwrite fresher ones.
#[derive(Debug, Default)]
pub struct Compositor {
    frame: Option<Frame>,
    last_pass: u64,
}

impl Compositor {
    pub fn new() -> Compositor {
        Compositor::default()
    }

    /// Encode and publish a rendered pixmap. Returns whether the frame was
    /// accepted; on encode failure the previous frame stays in place.
    pub fn submit(&mut self, pass: u64, pix: &Pixmap) -> bool {
        if pass < self.last_pass {
            debug!("Dropping stale render pass {} (newest is {})", pass, self.last_pass);
            return false;
        }
        match encode_png(pix) {
            Ok(png) => {
                self.frame = Some(Frame {
                    png,
                    width: pix.width,
                    height: pix.height,
                });
                self.last_pass = pass;
                true
            }
            Err(e) => {
                eprintln!("Warning: could not encode frame: {}", e);
                false
            }
        }
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

/// Encode a pixmap as PNG in memory, dropping the alpha channel.
pub fn encode_png(pix: &Pixmap) -> Result<Vec<u8>> {
    let mut rgb = Vec::with_capacity(pix.width as usize * pix.height as usize * 3);
    for chunk in pix.data.chunks(4) {
        if chunk.len() >= 3 {
            rgb.push(chunk[0]);
            rgb.push(chunk[1]);
            rgb.push(chunk[2]);
        }
    }
    let img = image::RgbImage::from_raw(pix.width, pix.height, rgb)
        .context("pixel buffer does not match its dimensions")?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .context("PNG encoding failed")?;
    Ok(out.into_inner())
}

/// Lay the panels out on one canvas: column dendrogram above the matrix,
/// row dendrogram to its left, labels to the right and below. Absent
/// panels collapse to zero and the rest shift accordingly.
pub fn assemble(
    heatmap: &Pixmap,
    row_dendro: Option<&Pixmap>,
    col_dendro: Option<&Pixmap>,
    row_labels: Option<&Pixmap>,
    col_labels: Option<&Pixmap>,
) -> Pixmap {
    let left = row_dendro.map_or(0, |p| p.width);
    let top = col_dendro.map_or(0, |p| p.height);
    let right = row_labels.map_or(0, |p| p.width);
    let bottom = col_labels.map_or(0, |p| p.height);

    let mut canvas = Pixmap::new(left + heatmap.width + right, top + heatmap.height + bottom);
    if let Some(p) = row_dendro {
        canvas.blit(p, 0, top);
    }
    if let Some(p) = col_dendro {
        canvas.blit(p, left, 0);
    }
    canvas.blit(heatmap, left, top);
    if let Some(p) = row_labels {
        canvas.blit(p, left + heatmap.width, top);
    }
    if let Some(p) = col_labels {
        canvas.blit(p, left, top + heatmap.height);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, r: u8, g: u8, b: u8) -> Pixmap {
        let mut pix = Pixmap::new(w, h);
        pix.fill_rect(0, 0, w, h, r, g, b);
        pix
    }

    #[test]
    fn png_encoding_round_trips_the_signature() {
        let png = encode_png(&solid(3, 2, 1, 2, 3)).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn truncated_buffer_fails_to_encode() {
        let mut pix = Pixmap::new(2, 2);
        pix.data.truncate(4);
        assert!(encode_png(&pix).is_err());
    }

    #[test]
    fn submit_publishes_a_frame() {
        let mut comp = Compositor::new();
        assert!(comp.frame().is_none());
        assert!(comp.submit(1, &solid(2, 2, 0, 0, 0)));
        let frame = comp.frame().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert!(!frame.png.is_empty());
    }

    #[test]
    fn failed_encode_keeps_the_previous_frame() {
        let mut comp = Compositor::new();
        assert!(comp.submit(1, &solid(2, 2, 7, 7, 7)));
        let before = comp.frame().unwrap().clone();

        let mut broken = Pixmap::new(2, 2);
        broken.data.truncate(4);
        assert!(!comp.submit(2, &broken));
        assert_eq!(comp.frame().unwrap(), &before);

        // the failed pass did not consume the generation
        assert!(comp.submit(2, &solid(3, 3, 0, 0, 0)));
        assert_eq!(comp.frame().unwrap().width, 3);
    }

    #[test]
    fn stale_pass_is_dropped() {
        let mut comp = Compositor::new();
        assert!(comp.submit(5, &solid(2, 2, 7, 7, 7)));
        assert!(!comp.submit(4, &solid(9, 9, 0, 0, 0)));
        assert_eq!(comp.frame().unwrap().width, 2);
        assert!(comp.submit(5, &solid(4, 4, 0, 0, 0)));
        assert_eq!(comp.frame().unwrap().width, 4);
    }

    #[test]
    fn assemble_places_panels_on_the_grid() {
        let heat = solid(4, 4, 1, 1, 1);
        let row_d = solid(3, 4, 2, 2, 2);
        let col_d = solid(4, 2, 3, 3, 3);
        let row_l = solid(5, 4, 4, 4, 4);
        let col_l = solid(4, 6, 5, 5, 5);
        let canvas = assemble(&heat, Some(&row_d), Some(&col_d), Some(&row_l), Some(&col_l));
        assert_eq!((canvas.width, canvas.height), (3 + 4 + 5, 2 + 4 + 6));
        assert_eq!(canvas.get(0, 2), (2, 2, 2));
        assert_eq!(canvas.get(3, 0), (3, 3, 3));
        assert_eq!(canvas.get(3, 2), (1, 1, 1));
        assert_eq!(canvas.get(7, 2), (4, 4, 4));
        assert_eq!(canvas.get(3, 6), (5, 5, 5));
        // top-left corner stays white
        assert_eq!(canvas.get(0, 0), (255, 255, 255));
    }

    #[test]
    fn assemble_collapses_missing_panels() {
        let heat = solid(4, 4, 1, 1, 1);
        let canvas = assemble(&heat, None, None, None, None);
        assert_eq!((canvas.width, canvas.height), (4, 4));
        assert_eq!(canvas.get(0, 0), (1, 1, 1));
    }
}
