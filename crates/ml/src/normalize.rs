/// Per-column z-score statistics fitted on a training matrix.
///
/// Applied to both the training rows and the rows scored later, so
/// inference sees exactly the training normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Standardizer {
    /// Z-scores are clamped to `[-CLAMP, CLAMP]`.
    pub const CLAMP: f32 = 5.0;

    /// Two-pass mean and population std over row-major rows of `width` values.
    ///
    /// Constant columns get a std of 1.0 so they standardize to zero offset.
    pub fn fit(features: &[f32], width: usize) -> Self {
        let rows = if width == 0 { 0 } else { features.len() / width };
        let mut mean = vec![0.0_f64; width];
        let mut m2 = vec![0.0_f64; width];
        if rows == 0 {
            return Self {
                mean: vec![0.0; width],
                std: vec![1.0; width],
            };
        }

        for row in features.chunks_exact(width) {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x as f64;
            }
        }
        let n = rows as f64;
        mean.iter_mut().for_each(|m| *m /= n);
        for row in features.chunks_exact(width) {
            for ((acc, &m), &x) in m2.iter_mut().zip(&mean).zip(row) {
                let d = x as f64 - m;
                *acc += d * d;
            }
        }

        let std = m2
            .iter()
            .map(|&v| {
                let s = (v / n).sqrt();
                if s < 1e-12 {
                    1.0
                } else {
                    s as f32
                }
            })
            .collect();

        Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardize one row into `out`.
    pub fn transform_into(&self, row: &[f32], out: &mut Vec<f32>) {
        out.extend(
            row.iter()
                .zip(self.mean.iter().zip(&self.std))
                .map(|(&x, (&m, &s))| ((x - m) / s).clamp(-Self::CLAMP, Self::CLAMP)),
        );
    }

    /// Standardize a row-major matrix.
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(features.len());
        for row in features.chunks_exact(self.width().max(1)) {
            self.transform_into(row, &mut out);
        }
        out
    }
}
