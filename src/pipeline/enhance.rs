//! Contrast-limited adaptive histogram equalisation on luminance.
//!
//! The page is converted to YCbCr (BT.601, full range); only Y is equalised
//! so coloured markup keeps its hue. The image is divided into a grid of
//! tiles, each tile gets a clipped-histogram equalisation lookup table, and
//! every pixel is mapped by bilinearly blending the tables of the four
//! nearest tile centres, which hides tile seams.

use image::{Rgb, RgbImage};

const BINS: usize = 256;

/// Equalise the luminance of `img` with CLAHE.
///
/// `clip_limit` is relative to a uniform histogram (2.0 means a bin may hold
/// at most twice its fair share before the excess is redistributed);
/// `tile_grid` is the number of tiles per side.
pub fn clahe_luminance(img: &RgbImage, clip_limit: f64, tile_grid: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    // Only the u8 luma plane is buffered; chroma is recomputed per pixel on
    // output so a large sheet never holds a full-resolution float plane.
    let luma: Vec<u8> = img.pixels().map(|p| rgb_to_ycbcr(*p).0).collect();

    let tiles_x = tile_grid.clamp(1, w);
    let tiles_y = tile_grid.clamp(1, h);
    let luts = tile_luts(&luma, w, h, tiles_x, tiles_y, clip_limit);

    let tile_w = f64::from(w) / f64::from(tiles_x);
    let tile_h = f64::from(h) / f64::from(tiles_y);

    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, fy) = neighbours(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, fx) = neighbours(x, tile_w, tiles_x);
            let (luma_in, cb, cr) = rgb_to_ycbcr(*img.get_pixel(x, y));
            let v = luma_in as usize;
            let lut = |tx: u32, ty: u32| f64::from(luts[(ty * tiles_x + tx) as usize][v]);

            let top = lut(tx0, ty0) * (1.0 - fx) + lut(tx1, ty0) * fx;
            let bottom = lut(tx0, ty1) * (1.0 - fx) + lut(tx1, ty1) * fx;
            let new_y = top * (1.0 - fy) + bottom * fy;

            out.put_pixel(x, y, ycbcr_to_rgb(new_y, cb, cr));
        }
    }
    out
}

/// Tile indices surrounding `pos` and the blend weight toward the second.
fn neighbours(pos: u32, tile_size: f64, tiles: u32) -> (u32, u32, f64) {
    let t = (f64::from(pos) + 0.5) / tile_size - 0.5;
    if t <= 0.0 {
        return (0, 0, 0.0);
    }
    let last = tiles - 1;
    let t0 = (t.floor() as u32).min(last);
    if t0 >= last {
        return (last, last, 0.0);
    }
    (t0, t0 + 1, t - f64::from(t0))
}

fn tile_luts(luma: &[u8], w: u32, h: u32, tiles_x: u32, tiles_y: u32, clip_limit: f64) -> Vec<[u8; BINS]> {
    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let y0 = ty * h / tiles_y;
        let y1 = (ty + 1) * h / tiles_y;
        for tx in 0..tiles_x {
            let x0 = tx * w / tiles_x;
            let x1 = (tx + 1) * w / tiles_x;

            let mut hist = [0u32; BINS];
            for y in y0..y1 {
                let row = (y * w) as usize;
                for &v in &luma[row + x0 as usize..row + x1 as usize] {
                    hist[v as usize] += 1;
                }
            }
            let n = (x1 - x0) * (y1 - y0);
            luts.push(equalisation_lut(&mut hist, n, clip_limit));
        }
    }
    luts
}

fn equalisation_lut(hist: &mut [u32; BINS], n: u32, clip_limit: f64) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    if n == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let clip = ((clip_limit * f64::from(n) / BINS as f64) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / BINS as u32;
    let remainder = (excess % BINS as u32) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut cdf = 0u64;
    for (i, &count) in hist.iter().enumerate() {
        cdf += u64::from(count);
        lut[i] = ((cdf * 255) / u64::from(n)).min(255) as u8;
    }
    lut
}

fn rgb_to_ycbcr(p: Rgb<u8>) -> (u8, f64, f64) {
    let [r, g, b] = p.0.map(f64::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (y.round().clamp(0.0, 255.0) as u8, cb, cr)
}

fn ycbcr_to_rgb(y: f64, cb: f64, cr: f64) -> Rgb<u8> {
    let (cb, cr) = (cb - 128.0, cr - 128.0);
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    Rgb([r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn luma_range(img: &RgbImage) -> (u8, u8) {
        let ys: Vec<u8> = img.pixels().map(|p| rgb_to_ycbcr(*p).0).collect();
        (*ys.iter().min().unwrap(), *ys.iter().max().unwrap())
    }

    #[test]
    fn stretches_low_contrast_page() {
        // Faded pencil: everything between 110 and 140.
        let img = RgbImage::from_fn(256, 256, |x, y| {
            let v = 110 + ((x + y) % 31) as u8;
            Rgb([v, v, v])
        });
        let (lo, hi) = luma_range(&img);
        let out = clahe_luminance(&img, 2.0, 8);
        let (new_lo, new_hi) = luma_range(&out);
        assert!(new_hi - new_lo > hi - lo, "{lo}-{hi} → {new_lo}-{new_hi}");
    }

    #[test]
    fn keeps_dimensions_and_greys_stay_grey() {
        let img = RgbImage::from_fn(97, 61, |x, _| {
            let v = (x * 2) as u8;
            Rgb([v, v, v])
        });
        let out = clahe_luminance(&img, 2.0, 8);
        assert_eq!(out.dimensions(), (97, 61));
        for p in out.pixels() {
            let [r, g, b] = p.0;
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "{:?}", p);
        }
    }

    #[test]
    fn hue_is_preserved() {
        let mut img = RgbImage::from_pixel(64, 64, Rgb([240, 240, 240]));
        for x in 10..50 {
            img.put_pixel(x, 32, Rgb([200, 30, 30]));
        }
        let out = clahe_luminance(&img, 2.0, 4);
        let p = out.get_pixel(30, 32);
        assert!(p.0[0] > p.0[1] && p.0[0] > p.0[2], "{:?}", p);
    }

    #[test]
    fn chroma_is_carried_through_unchanged() {
        // Muted colours around mid-grey, like pencil and marker on paper.
        let img = RgbImage::from_fn(80, 60, |x, y| {
            let g = 70 + ((x + 2 * y) % 120) as u8;
            Rgb([g + 20, g, g - 20])
        });
        let out = clahe_luminance(&img, 2.0, 4);
        for (a, b) in img.pixels().zip(out.pixels()) {
            let (_, cb_in, cr_in) = rgb_to_ycbcr(*a);
            let (y_out, cb_out, cr_out) = rgb_to_ycbcr(*b);
            // Channel clamping can only bend chroma for near-black/white output.
            if !(48..=207).contains(&y_out) {
                continue;
            }
            assert!((cb_in - cb_out).abs() <= 1.5, "{a:?} -> {b:?}");
            assert!((cr_in - cr_out).abs() <= 1.5, "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn tiny_image_does_not_panic() {
        let img = RgbImage::from_pixel(3, 2, Rgb([50, 60, 70]));
        assert_eq!(clahe_luminance(&img, 2.0, 8).dimensions(), (3, 2));
        let empty = RgbImage::new(0, 0);
        assert_eq!(clahe_luminance(&empty, 2.0, 8).dimensions(), (0, 0));
    }

    #[test]
    fn lut_is_monotonic() {
        let mut hist = [0u32; BINS];
        hist[10] = 500;
        hist[200] = 20;
        let lut = equalisation_lut(&mut hist, 520, 2.0);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }
}
