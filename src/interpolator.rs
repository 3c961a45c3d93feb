use ndarray::ArrayView2;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Samples `slice` at a fractional (row, column) position.
    /// Returns `None` outside the slice.
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<'_, i16>, y: f64, x: f64) -> Option<f64> {
        let (height, width) = slice.dim();
        if height == 0 || width == 0 {
            return None;
        }
        let max_y = (height - 1) as f64;
        let max_x = (width - 1) as f64;
        if y < -0.5 || x < -0.5 || y > max_y + 0.5 || x > max_x + 0.5 {
            return None;
        }
        let y = y.clamp(0.0, max_y);
        let x = x.clamp(0.0, max_x);

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f64;
        let dx = x - x0 as f64;

        let v00 = slice[[y0, x0]] as f64;
        let v01 = slice[[y0, x1]] as f64;
        let v10 = slice[[y1, x0]] as f64;
        let v11 = slice[[y1, x1]] as f64;

        let v0 = v00.mul_add(1.0 - dx, v01 * dx);
        let v1 = v10.mul_add(1.0 - dx, v11 * dx);

        Some(v0.mul_add(1.0 - dy, v1 * dy))
    }

    /// Nearest-neighbour lookup, used for label values that must not blend.
    #[inline]
    pub(crate) fn nearest<T: Copy>(slice: &ArrayView2<'_, T>, y: f64, x: f64) -> Option<T> {
        let (height, width) = slice.dim();
        let (row, col) = (y.round(), x.round());
        if row < 0.0 || col < 0.0 || row >= height as f64 || col >= width as f64 {
            return None;
        }
        Some(slice[[row as usize, col as usize]])
    }
}
