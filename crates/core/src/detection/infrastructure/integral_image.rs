use image::GrayImage;
use ndarray::Array2;

/// Summed-area tables over a grayscale image.
///
/// Both tables have one extra leading row and column of zeros, so the sum
/// of any rectangle takes four lookups and no bounds special-casing.
pub struct IntegralImage {
    sum: Array2<u64>,
    sq_sum: Array2<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let mut sum = Array2::<u64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<u64>::zeros((h + 1, w + 1));

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = u64::from(gray.get_pixel(x as u32, y as u32).0[0]);
                row += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + row_sq;
            }
        }

        Self { sum, sq_sum }
    }

    pub fn width(&self) -> usize {
        self.sum.ncols() - 1
    }

    pub fn height(&self) -> usize {
        self.sum.nrows() - 1
    }

    /// Sum of pixel values in `[x, x + w) x [y, y + h)`.
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sum, x, y, w, h)
    }

    /// Sum of squared pixel values in `[x, x + w) x [y, y + h)`.
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        Self::lookup(&self.sq_sum, x, y, w, h)
    }

    fn lookup(table: &Array2<u64>, x: usize, y: usize, w: usize, h: usize) -> u64 {
        table[[y + h, x + w]] + table[[y, x]] - table[[y, x + w]] - table[[y + h, x]]
    }
}
