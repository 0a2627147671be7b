//! Modified median-cut quantization (MMCQ).
//!
//! Colors are reduced to 5 significant bits per channel and counted in a
//! 32768-bin histogram. The box spanning every sampled color is split at the
//! population median of its longest side until the requested number of boxes
//! exists. The first 75% of splits take the most populated box; the rest take
//! the box with the largest population × volume, so large sparse regions of
//! color space still get a representative. Each final box contributes its
//! population-weighted average color.

use std::cmp::Reverse;

/// An RGB triple.
pub type Rgb = [u8; 3];

const SIGBITS: u32 = 5;
const RSHIFT: u32 = 8 - SIGBITS;
const HISTO_SIZE: usize = 1 << (3 * SIGBITS);
const MAX_ITERATIONS: usize = 1000;
const FRACT_BY_POPULATION: f64 = 0.75;

/// Largest palette the quantizer will produce.
pub const MAX_COLORS: usize = 256;

fn color_index(r: i32, g: i32, b: i32) -> usize {
    ((r << (2 * SIGBITS)) + (g << SIGBITS) + b) as usize
}

struct Histogram {
    bins: Vec<u32>,
}

impl Histogram {
    fn from_pixels(pixels: &[Rgb]) -> Self {
        let mut bins = vec![0u32; HISTO_SIZE];
        for &[r, g, b] in pixels {
            let index = color_index(
                i32::from(r >> RSHIFT),
                i32::from(g >> RSHIFT),
                i32::from(b >> RSHIFT),
            );
            bins[index] += 1;
        }
        Histogram { bins }
    }

    fn get(&self, r: i32, g: i32, b: i32) -> u32 {
        self.bins[color_index(r, g, b)]
    }
}

/// Axis-aligned box in reduced color space, bounds inclusive.
#[derive(Clone, Debug)]
struct VBox {
    lo: [i32; 3],
    hi: [i32; 3],
    count: u64,
}

impl VBox {
    fn new(lo: [i32; 3], hi: [i32; 3], histo: &Histogram) -> Self {
        let mut vbox = VBox { lo, hi, count: 0 };
        let mut count = 0u64;
        vbox.for_each_cell(|r, g, b| count += u64::from(histo.get(r, g, b)));
        vbox.count = count;
        vbox
    }

    fn from_pixels(pixels: &[Rgb], histo: &Histogram) -> Self {
        let mut lo = [i32::MAX; 3];
        let mut hi = [i32::MIN; 3];
        for pixel in pixels {
            for channel in 0..3 {
                let value = i32::from(pixel[channel] >> RSHIFT);
                lo[channel] = lo[channel].min(value);
                hi[channel] = hi[channel].max(value);
            }
        }
        VBox::new(lo, hi, histo)
    }

    fn width(&self, axis: usize) -> i32 {
        (self.hi[axis] - self.lo[axis] + 1).max(0)
    }

    fn volume(&self) -> u64 {
        (0..3).map(|axis| self.width(axis) as u64).product()
    }

    fn priority(&self) -> u64 {
        self.count * self.volume()
    }

    fn for_each_cell(&self, mut f: impl FnMut(i32, i32, i32)) {
        for r in self.lo[0]..=self.hi[0] {
            for g in self.lo[1]..=self.hi[1] {
                for b in self.lo[2]..=self.hi[2] {
                    f(r, g, b);
                }
            }
        }
    }

    /// Population-weighted mean color, or the box center when empty.
    fn average(&self, histo: &Histogram) -> Rgb {
        let mult = f64::from(1u32 << RSHIFT);
        let mut total = 0f64;
        let mut sums = [0f64; 3];
        self.for_each_cell(|r, g, b| {
            let h = f64::from(histo.get(r, g, b));
            total += h;
            sums[0] += h * (f64::from(r) + 0.5) * mult;
            sums[1] += h * (f64::from(g) + 0.5) * mult;
            sums[2] += h * (f64::from(b) + 0.5) * mult;
        });

        if total > 0.0 {
            sums.map(|sum| (sum / total) as u8)
        } else {
            [0, 1, 2].map(|axis| {
                (mult * f64::from(self.lo[axis] + self.hi[axis] + 1) / 2.0) as u8
            })
        }
    }

    /// Population of the plane where `axis` equals `value`.
    fn plane_count(&self, histo: &Histogram, axis: usize, value: i32) -> u64 {
        let mut plane = self.clone();
        plane.lo[axis] = value;
        plane.hi[axis] = value;
        let mut count = 0u64;
        plane.for_each_cell(|r, g, b| count += u64::from(histo.get(r, g, b)));
        count
    }
}

enum Split {
    Two(VBox, VBox),
    /// Box cannot be divided further.
    Single(VBox),
    Empty,
}

fn median_cut(histo: &Histogram, vbox: &VBox) -> Split {
    if vbox.count == 0 {
        return Split::Empty;
    }
    if vbox.count == 1 {
        return Split::Single(vbox.clone());
    }

    // Longest side first; ties prefer red, then green
    let mut axes = [0, 1, 2];
    axes.sort_by_key(|&axis| Reverse(vbox.width(axis)));

    axes.into_iter()
        .filter(|&axis| vbox.width(axis) > 1)
        .find_map(|axis| cut_along(histo, vbox, axis))
        .map_or_else(|| Split::Single(vbox.clone()), |(lower, upper)| Split::Two(lower, upper))
}

/// Cut at the population median of `axis`, or `None` if every pixel lies in one plane.
fn cut_along(histo: &Histogram, vbox: &VBox, axis: usize) -> Option<(VBox, VBox)> {
    let (lo, hi) = (vbox.lo[axis], vbox.hi[axis]);

    let mut total = 0u64;
    let partial: Vec<u64> = (lo..=hi)
        .map(|value| {
            total += vbox.plane_count(histo, axis, value);
            total
        })
        .collect();
    let partial_at = |value: i32| partial[(value - lo) as usize];
    let lookahead_at = |value: i32| total - partial_at(value);

    let median = (lo..=hi).find(|&value| partial_at(value) as f64 > total as f64 / 2.0)?;

    let left = median - lo;
    let right = hi - median;
    let mut cut = if left <= right {
        (hi - 1).min((2 * median + right) / 2)
    } else {
        lo.max((2 * (median - 1) - left) / 2)
    };

    // Avoid empty halves
    while cut < hi && partial_at(cut) == 0 {
        cut += 1;
    }
    let mut upper_count = lookahead_at(cut);
    while upper_count == 0 && cut > lo && partial_at(cut - 1) != 0 {
        cut -= 1;
        upper_count = lookahead_at(cut);
    }

    let mut lower_hi = vbox.hi;
    lower_hi[axis] = cut;
    let mut upper_lo = vbox.lo;
    upper_lo[axis] = cut + 1;

    let lower = VBox::new(vbox.lo, lower_hi, histo);
    let upper = VBox::new(upper_lo, vbox.hi, histo);
    (lower.count > 0 && upper.count > 0).then_some((lower, upper))
}

/// Split boxes, highest `key` first, until `target` boxes exist.
fn split_until(
    histo: &Histogram,
    queue: &mut Vec<VBox>,
    settled: &mut Vec<VBox>,
    target: usize,
    key: fn(&VBox) -> u64,
) {
    let mut colors = queue.len() + settled.len();
    let mut iterations = 0;

    while colors < target && iterations < MAX_ITERATIONS {
        iterations += 1;
        queue.sort_by_key(key);
        let Some(vbox) = queue.pop() else {
            return;
        };

        match median_cut(histo, &vbox) {
            Split::Two(lower, upper) => {
                queue.push(lower);
                queue.push(upper);
                colors += 1;
            }
            Split::Single(vbox) => settled.push(vbox),
            Split::Empty => colors -= 1,
        }
    }
}

/// Reduce `pixels` to at most `max_colors` representative colors.
///
/// The palette is ordered by population × volume of each color's box,
/// largest first. Returns an empty palette when there are no pixels or
/// `max_colors` is outside `1..=256`; fewer colors than requested are returned
/// when the input holds fewer distinct (reduced) colors.
///
/// `max_colors == 1` yields the single average color of the whole image.
/// Classic MMCQ implementations reject counts below 2 and return nothing.
pub fn quantize(pixels: &[Rgb], max_colors: usize) -> Vec<Rgb> {
    if pixels.is_empty() || max_colors == 0 || max_colors > MAX_COLORS {
        return Vec::new();
    }

    let histo = Histogram::from_pixels(pixels);
    let mut queue = vec![VBox::from_pixels(pixels, &histo)];
    let mut settled = Vec::new();

    let by_population = (FRACT_BY_POPULATION * max_colors as f64).ceil() as usize;
    split_until(&histo, &mut queue, &mut settled, by_population, |v| v.count);
    split_until(&histo, &mut queue, &mut settled, max_colors, VBox::priority);

    queue.append(&mut settled);
    queue.retain(|v| v.count > 0);
    queue.sort_by_key(VBox::priority);
    queue.iter().rev().map(|v| v.average(&histo)).collect()
}
