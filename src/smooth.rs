/// Natural cubic spline through strictly increasing knots.
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Returns `None` when the inputs differ in length or have fewer than
    /// two knots.
    pub fn fit(xs: &[f32], ys: &[f32]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return None;
        }
        let xs: Vec<f64> = xs.iter().map(|&x| x as f64).collect();
        let ys: Vec<f64> = ys.iter().map(|&y| y as f64).collect();
        let mut m = vec![0.0; n];

        if n > 2 {
            // Thomas algorithm on the interior knots; ends are pinned at zero.
            let mut c_prime = vec![0.0; n];
            let mut d_prime = vec![0.0; n];
            for i in 1..n - 1 {
                let h0 = xs[i] - xs[i - 1];
                let h1 = xs[i + 1] - xs[i];
                let a = h0;
                let b = 2.0 * (h0 + h1);
                let c = h1;
                let d = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
                let denom = b - a * c_prime[i - 1];
                c_prime[i] = c / denom;
                d_prime[i] = (d - a * d_prime[i - 1]) / denom;
            }
            for i in (1..n - 1).rev() {
                m[i] = d_prime[i] - c_prime[i] * m[i + 1];
            }
        }

        Some(Self { xs, ys, m })
    }

    pub fn eval(&self, x: f32) -> f32 {
        let x = x as f64;
        let last = self.xs.len() - 1;
        let i = match self.xs.partition_point(|&k| k <= x) {
            0 => 0,
            p => (p - 1).min(last - 1),
        };
        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;
        let y = a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a * a * a - a) * self.m[i] + (b * b * b - b) * self.m[i + 1]) * h * h / 6.0;
        y as f32
    }

    /// Sample `count` evenly spaced points from the first to the last knot.
    pub fn resample(&self, count: usize) -> Vec<[f32; 2]> {
        let start = self.xs[0] as f32;
        let end = self.xs[self.xs.len() - 1] as f32;
        match count {
            0 => Vec::new(),
            1 => vec![[start, self.eval(start)]],
            _ => (0..count)
                .map(|i| {
                    let t = i as f32 / (count - 1) as f32;
                    let x = start + (end - start) * t;
                    [x, self.eval(x)]
                })
                .collect(),
        }
    }
}

/// Curve points for a batch: a spline resampled to `4 * len` points when
/// `smooth` is set and the data allows it, the raw points otherwise.
pub fn curve_points(batch: &[f32], bin_width: f32, smooth: bool) -> Vec<[f32; 2]> {
    let xs: Vec<f32> = (0..batch.len()).map(|i| i as f32 * bin_width).collect();
    let finite = batch.iter().all(|v| v.is_finite());
    if smooth && finite && batch.len() >= 3 && bin_width > 0.0 {
        if let Some(spline) = CubicSpline::fit(&xs, batch) {
            return spline.resample(batch.len() * 4);
        }
    }
    xs.into_iter().zip(batch.iter().copied()).map(|(x, y)| [x, y]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_spline_passes_through_knots() {
        let xs = [0.0, 4.0, 8.0, 12.0, 16.0];
        let ys = [0.0, 10.0, 3.0, 150.0, 20.0];
        let spline = CubicSpline::fit(&xs, &ys).unwrap();
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert!(close(spline.eval(*x), *y), "at {x}: {}", spline.eval(*x));
        }
    }

    #[test]
    fn test_linear_data_stays_linear() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let spline = CubicSpline::fit(&xs, &ys).unwrap();
        assert!(close(spline.eval(0.5), 2.0));
        assert!(close(spline.eval(2.25), 5.5));
    }

    #[test]
    fn test_two_knots_interpolate_linearly() {
        let spline = CubicSpline::fit(&[0.0, 2.0], &[0.0, 4.0]).unwrap();
        assert!(close(spline.eval(1.0), 2.0));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(CubicSpline::fit(&[0.0], &[1.0]).is_none());
        assert!(CubicSpline::fit(&[0.0, 1.0], &[1.0]).is_none());
    }

    #[test]
    fn test_resample_spans_the_knots() {
        let spline = CubicSpline::fit(&[0.0, 4.0, 8.0], &[1.0, 2.0, 1.0]).unwrap();
        let points = spline.resample(12);
        assert_eq!(points.len(), 12);
        assert_eq!(points[0][0], 0.0);
        assert!(close(points[11][0], 8.0));
        assert!(close(points[11][1], 1.0));
    }

    #[test]
    fn test_curve_points_smoothed_length() {
        let batch: Vec<f32> = (0..64).map(|i| (i % 7) as f32).collect();
        let points = curve_points(&batch, 4.0, true);
        assert_eq!(points.len(), 256);
        assert!(close(points[255][0], 63.0 * 4.0));
    }

    #[test]
    fn test_curve_points_raw_when_disabled_or_not_finite() {
        let batch = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            curve_points(&batch, 2.0, false),
            vec![[0.0, 1.0], [2.0, 2.0], [4.0, 3.0], [6.0, 4.0]]
        );
        let noisy = [1.0, f32::NAN, 3.0, 4.0];
        assert_eq!(curve_points(&noisy, 2.0, true).len(), 4);
    }
}
