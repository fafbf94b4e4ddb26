// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Row bands — disjoint, exclusively borrowed slices of one image's pixel
// buffer, converted to grayscale concurrently.
//
// The buffer is carved up with `split_at_mut`, so each band task holds the
// only mutable reference to its rows and the compiler rules out overlap.
// Band tasks run on scoped threads; the scope joins every one of them
// before returning, whatever happened to the others.

use std::any::Any;
use std::ops::Range;
use std::thread;

use image::RgbaImage;
use tracing::{debug, instrument, warn};

use graywerk_core::error::{GraywerkError, Result};

const CHANNELS: usize = 4;

/// Split `[0, height)` into `bands` contiguous half-open ranges.
///
/// Every band gets `height / bands` rows; the last one also takes the
/// remainder. When `height < bands` the leading bands are empty.
pub fn partition_rows(height: u32, bands: u32) -> Vec<Range<u32>> {
    let bands = bands.max(1);
    let rows_per_band = height / bands;
    (0..bands)
        .map(|i| {
            let start = i * rows_per_band;
            let end = if i == bands - 1 {
                height
            } else {
                start + rows_per_band
            };
            start..end
        })
        .collect()
}

/// Grayscale one RGBA pixel: red, green and blue become their truncated
/// integer mean, alpha is kept.
#[inline]
pub fn grayscale_pixel([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let gray = ((u16::from(r) + u16::from(g) + u16::from(b)) / 3) as u8;
    [gray, gray, gray, a]
}

/// Exclusive view over rows `[start, end)` of one image.
pub struct RowBand<'a> {
    index: usize,
    start: u32,
    end: u32,
    width: u32,
    pixels: &'a mut [u8],
}

impl<'a> RowBand<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rows(&self) -> Range<u32> {
        self.start..self.end
    }

    /// Mutable access to pixel `(x, y)`, `y` in image coordinates.
    ///
    /// # Panics
    ///
    /// If `(x, y)` lies outside this band.
    #[cfg(test)]
    fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        assert!(
            x < self.width && (self.start..self.end).contains(&y),
            "pixel ({x}, {y}) outside band rows {}..{} of width {}",
            self.start,
            self.end,
            self.width
        );
        let offset = ((y - self.start) as usize * self.width as usize + x as usize) * CHANNELS;
        &mut self.pixels[offset..offset + CHANNELS]
    }

    /// Convert every pixel of the band in place.
    pub fn apply_grayscale(&mut self) {
        for px in self.pixels.chunks_exact_mut(CHANNELS) {
            let gray = grayscale_pixel([px[0], px[1], px[2], px[3]]);
            px.copy_from_slice(&gray);
        }
    }
}

/// Work applied to each band on its own thread.
pub type BandOp = fn(&mut RowBand<'_>);

/// The grayscale [`BandOp`].
pub fn grayscale_band(band: &mut RowBand<'_>) {
    band.apply_grayscale();
}

/// Hand out one exclusive [`RowBand`] per range.
///
/// `ranges` must tile `[0, height)` in order, as produced by
/// [`partition_rows`].
pub fn split_bands<'a>(image: &'a mut RgbaImage, ranges: &[Range<u32>]) -> Result<Vec<RowBand<'a>>> {
    let (width, height) = image.dimensions();
    let row_bytes = width as usize * CHANNELS;
    let mut rest: &'a mut [u8] = &mut **image;
    let mut next_row = 0;
    let mut bands = Vec::with_capacity(ranges.len());

    for (index, range) in ranges.iter().enumerate() {
        if range.start != next_row || range.end < range.start || range.end > height {
            return Err(GraywerkError::RowProcessing {
                band: index,
                start: range.start,
                end: range.end,
                reason: format!("does not continue the partition at row {next_row} of {height}"),
            });
        }
        let (head, tail) =
            std::mem::take(&mut rest).split_at_mut((range.end - range.start) as usize * row_bytes);
        bands.push(RowBand {
            index,
            start: range.start,
            end: range.end,
            width,
            pixels: head,
        });
        rest = tail;
        next_row = range.end;
    }

    if next_row != height {
        return Err(GraywerkError::RowProcessing {
            band: ranges.len().saturating_sub(1),
            start: next_row,
            end: height,
            reason: "rows left uncovered".into(),
        });
    }
    Ok(bands)
}

/// Convert `image` to grayscale with one thread per band.
///
/// Blocks until every band thread has finished. Any band failure fails the
/// whole image; the first one is returned and the rest are logged.
pub fn process_bands(image: &mut RgbaImage, bands: u32) -> Result<()> {
    process_bands_with(image, bands, grayscale_band)
}

/// Run `op` over every band of `image`, one thread per band, and join them
/// all before reporting.
#[instrument(skip(image, op), fields(width = image.width(), height = image.height()))]
pub fn process_bands_with(image: &mut RgbaImage, bands: u32, op: BandOp) -> Result<()> {
    let ranges = partition_rows(image.height(), bands);
    let row_bands = split_bands(image, &ranges)?;

    let failures: Vec<GraywerkError> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(row_bands.len());
        let mut failures = Vec::new();

        for mut band in row_bands {
            let (index, rows) = (band.index(), band.rows());
            let spawned = thread::Builder::new()
                .name(format!("band-{index}"))
                .spawn_scoped(scope, move || op(&mut band));
            match spawned {
                Ok(handle) => handles.push((index, rows, handle)),
                Err(err) => failures.push(band_error(index, &rows, err.to_string())),
            }
        }

        for (index, rows, handle) in handles {
            match handle.join() {
                Ok(()) => debug!(band = index, start = rows.start, end = rows.end, "band done"),
                Err(payload) => failures.push(band_error(index, &rows, panic_message(payload.as_ref()))),
            }
        }
        failures
    });

    let mut failures = failures.into_iter();
    match failures.next() {
        None => Ok(()),
        Some(first) => {
            for other in failures {
                warn!(error = %other, "additional band failure");
            }
            Err(first)
        }
    }
}

fn band_error(band: usize, rows: &Range<u32>, reason: String) -> GraywerkError {
    GraywerkError::RowProcessing {
        band,
        start: rows.start,
        end: rows.end,
        reason,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "band thread panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use image::Rgba;

    use super::*;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([
                (x * 7 % 256) as u8,
                (y * 13 % 256) as u8,
                ((x + y) * 5 % 256) as u8,
                (x * y % 256) as u8,
            ])
        })
    }

    #[test]
    fn height_seven_four_bands() {
        assert_eq!(partition_rows(7, 4), vec![0..1, 1..2, 2..3, 3..7]);
    }

    #[test]
    fn partition_covers_every_row_once() {
        for height in 0..40 {
            for bands in 1..9 {
                let ranges = partition_rows(height, bands);
                assert_eq!(ranges.len(), bands as usize);

                let mut next = 0;
                for range in &ranges {
                    assert_eq!(range.start, next, "gap or overlap at h={height} k={bands}");
                    assert!(range.end >= range.start);
                    next = range.end;
                }
                assert_eq!(next, height);

                let last = ranges.last().unwrap();
                assert_eq!(last.end - last.start, height / bands + height % bands);
            }
        }
    }

    #[test]
    fn gray_is_truncated_mean_and_alpha_kept() {
        assert_eq!(grayscale_pixel([10, 20, 31, 200]), [20, 20, 20, 200]);
        // 255 + 255 + 254 = 764, 764 / 3 = 254.67 -> 254
        assert_eq!(grayscale_pixel([255, 255, 254, 0]), [254, 254, 254, 0]);
        assert_eq!(grayscale_pixel([1, 1, 0, 7]), [0, 0, 0, 7]);
    }

    #[test]
    fn grayscale_is_idempotent() {
        for r in (0..=255u16).step_by(17) {
            for g in (0..=255u16).step_by(15) {
                for b in (0..=255u16).step_by(51) {
                    let once = grayscale_pixel([r as u8, g as u8, b as u8, 128]);
                    assert_eq!(grayscale_pixel(once), once);
                }
            }
        }
    }

    #[test]
    fn banded_result_matches_single_pass() {
        let original = gradient(33, 29);

        let mut banded = original.clone();
        process_bands(&mut banded, 4).unwrap();

        for (x, y, px) in original.enumerate_pixels() {
            let expected = grayscale_pixel(px.0);
            assert_eq!(banded.get_pixel(x, y).0, expected, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn more_bands_than_rows() {
        let mut image = gradient(5, 2);
        let expected = {
            let mut single = image.clone();
            process_bands(&mut single, 1).unwrap();
            single
        };
        process_bands(&mut image, 8).unwrap();
        assert_eq!(image, expected);
    }

    #[test]
    fn bands_are_disjoint_views() {
        let mut image = gradient(4, 7);
        let ranges = partition_rows(7, 4);
        let mut bands = split_bands(&mut image, &ranges).unwrap();

        let last = bands.last_mut().unwrap();
        assert_eq!(last.rows(), 3..7);
        last.pixel_mut(3, 6).copy_from_slice(&[1, 2, 3, 4]);
        drop(bands);

        assert_eq!(image.get_pixel(3, 6).0, [1, 2, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "outside band")]
    fn pixel_outside_band_is_an_invariant_violation() {
        let mut image = gradient(4, 8);
        let ranges = partition_rows(8, 2);
        let mut bands = split_bands(&mut image, &ranges).unwrap();
        bands[0].pixel_mut(0, 4);
    }

    static SLOW_BANDS_FINISHED: AtomicUsize = AtomicUsize::new(0);

    fn second_band_panics(band: &mut RowBand<'_>) {
        if band.index() == 1 {
            panic!("band exploded");
        }
        std::thread::sleep(Duration::from_millis(50));
        band.apply_grayscale();
        SLOW_BANDS_FINISHED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn failed_band_fails_image_after_all_bands_join() {
        let mut image = gradient(8, 8);
        let err = process_bands_with(&mut image, 4, second_band_panics).unwrap_err();

        match err {
            GraywerkError::RowProcessing { band, start, end, reason } => {
                assert_eq!((band, start, end), (1, 2, 4));
                assert_eq!(reason, "band exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(SLOW_BANDS_FINISHED.load(Ordering::SeqCst), 3);
    }

    fn odd_bands_panic(band: &mut RowBand<'_>) {
        if band.index() % 2 == 1 {
            panic!("odd band {}", band.index());
        }
        band.apply_grayscale();
    }

    #[test]
    fn first_of_several_band_failures_is_returned() {
        let mut image = gradient(5, 12);
        let err = process_bands_with(&mut image, 4, odd_bands_panic).unwrap_err();
        assert!(matches!(
            err,
            GraywerkError::RowProcessing { band: 1, ref reason, .. } if reason == "odd band 1"
        ));
    }

    #[test]
    fn malformed_partition_is_rejected() {
        let mut image = gradient(4, 8);
        let overlapping = vec![0..5, 4..8];
        assert!(matches!(
            split_bands(&mut image, &overlapping),
            Err(GraywerkError::RowProcessing { band: 1, .. })
        ));

        let short = vec![0..4];
        assert!(matches!(
            split_bands(&mut image, &short),
            Err(GraywerkError::RowProcessing { .. })
        ));
    }
}
