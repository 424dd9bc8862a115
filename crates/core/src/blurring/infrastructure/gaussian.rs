/// ROI rectangle within a frame, used to pass region coordinates without many arguments.
#[derive(Clone, Copy, Debug)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

/// Sigma used when the caller asks for a deviation of zero: derived from
/// the kernel size the same way OpenCV's `getGaussianKernel` does.
pub fn auto_sigma(kernel_size: usize) -> f64 {
    0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Binomial kernels OpenCV uses instead of the formula for sizes up to 7.
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// Precompute a normalised 1D Gaussian kernel of the given size.
///
/// `kernel_size` must be odd and >= 1.
pub fn gaussian_kernel_1d(kernel_size: usize) -> Vec<f32> {
    debug_assert!(kernel_size >= 1 && kernel_size % 2 == 1);
    if let Some(table) = SMALL_KERNELS.get(kernel_size / 2) {
        return table.to_vec();
    }
    let sigma = auto_sigma(kernel_size);
    let half = (kernel_size / 2) as f64;
    let mut kernel_f64: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel_f64.iter().sum();
    for v in &mut kernel_f64 {
        *v /= sum;
    }
    kernel_f64.iter().map(|&v| v as f32).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the
/// edge sample (`dcb|abcd|cba`).
fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = i.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Convenience wrapper that allocates its own kernel and temp buffer.
#[cfg(test)]
pub fn separable_gaussian_blur(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel_size: usize,
) {
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let kernel = gaussian_kernel_1d(kernel_size);
    let mut temp = Vec::new();
    separable_gaussian_blur_with_kernel(data, width, height, channels, &kernel, &mut temp);
}

/// Apply a separable Gaussian blur using a pre-computed kernel, reusing `temp`.
///
/// Borders are mirrored inside the buffer, so a ROI is blurred using only
/// its own pixels.
pub fn separable_gaussian_blur_with_kernel(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    let kernel_size = kernel.len();
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = (kernel_size / 2) as isize;

    temp.clear();
    temp.resize(width * height * channels, 0.0);

    // Horizontal pass: data → temp
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sx = reflect_101(x as isize + k as isize - half, width);
                    sum += data[(y * width + sx) * channels + c] as f32 * w;
                }
                temp[(y * width + x) * channels + c] = sum;
            }
        }
    }

    // Vertical pass: temp → data
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for (k, &w) in kernel.iter().enumerate() {
                    let sy = reflect_101(y as isize + k as isize - half, height);
                    sum += temp[(sy * width + x) * channels + c] * w;
                }
                data[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Extract a rectangular ROI from frame data into a reusable buffer.
pub fn extract_roi(
    data: &[u8],
    frame_width: usize,
    channels: usize,
    rect: RoiRect,
    roi: &mut Vec<u8>,
) {
    roi.resize(rect.w * rect.h * channels, 0);
    for row in 0..rect.h {
        let src_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        let dst_offset = row * rect.w * channels;
        roi[dst_offset..dst_offset + rect.w * channels]
            .copy_from_slice(&data[src_offset..src_offset + rect.w * channels]);
    }
}

/// Write a blurred ROI buffer back into frame data.
pub fn write_roi_back(
    data: &mut [u8],
    roi: &[u8],
    frame_width: usize,
    channels: usize,
    rect: RoiRect,
) {
    for row in 0..rect.h {
        let dst_offset = ((rect.y + row) * frame_width + rect.x) * channels;
        let src_offset = row * rect.w * channels;
        data[dst_offset..dst_offset + rect.w * channels]
            .copy_from_slice(&roi[src_offset..src_offset + rect.w * channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(3, 0.8)]
    #[case(15, 2.6)]
    #[case(51, 8.0)]
    fn test_auto_sigma(#[case] kernel_size: usize, #[case] expected: f64) {
        assert_relative_eq!(auto_sigma(kernel_size), expected, epsilon = 1e-9);
    }

    #[rstest]
    #[case(3, &[0.25, 0.5, 0.25])]
    #[case(5, &[0.0625, 0.25, 0.375, 0.25, 0.0625])]
    #[case(7, &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125])]
    fn test_small_kernels_are_binomial(#[case] kernel_size: usize, #[case] expected: &[f32]) {
        let kernel = gaussian_kernel_1d(kernel_size);
        assert_eq!(kernel.len(), expected.len());
        for (k, e) in kernel.iter().zip(expected) {
            assert_relative_eq!(*k, *e);
        }
    }

    #[test]
    fn test_kernel_nine_uses_sigma_formula() {
        let kernel = gaussian_kernel_1d(9);
        let sigma = auto_sigma(9);
        let ratio = f64::from(kernel[3]) / f64::from(kernel[4]);
        assert_relative_eq!(ratio, (-1.0 / (2.0 * sigma * sigma)).exp(), epsilon = 1e-5);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        let k = gaussian_kernel_1d(15);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_kernel_is_symmetric_with_peak_in_center() {
        let k = gaussian_kernel_1d(7);
        for i in 0..k.len() / 2 {
            assert_relative_eq!(k[i], k[k.len() - 1 - i], epsilon = 1e-6);
            assert!(k[3] > k[i]);
        }
    }

    #[rstest]
    #[case::inside(2, 5, 2)]
    #[case::one_before(-1, 5, 1)]
    #[case::two_before(-2, 5, 2)]
    #[case::one_after(5, 5, 3)]
    #[case::far_after(9, 5, 1)]
    #[case::single_sample(-3, 1, 0)]
    fn test_reflect_101(#[case] i: isize, #[case] len: usize, #[case] expected: usize) {
        assert_eq!(reflect_101(i, len), expected);
    }

    #[test]
    fn test_blur_uniform_image_unchanged() {
        let mut data = vec![128u8; 10 * 10 * 3];
        separable_gaussian_blur(&mut data, 10, 10, 3, 5);
        assert!(data.iter().all(|&v| v == 128));
    }

    #[test]
    fn test_blur_spreads_single_bright_pixel() {
        let mut data = vec![0u8; 10 * 10 * 3];
        let cx = 5 * 10 + 5;
        data[cx * 3..cx * 3 + 3].fill(255);

        separable_gaussian_blur(&mut data, 10, 10, 3, 5);

        assert!(data[cx * 3] < 255);
        assert!(data[(5 * 10 + 6) * 3] > 0);
    }

    #[test]
    fn test_kernel_size_1_is_identity() {
        let mut data: Vec<u8> = (0..75).collect();
        let original = data.clone();
        separable_gaussian_blur(&mut data, 5, 5, 3, 1);
        assert_eq!(data, original);
    }

    #[test]
    fn test_kernel_wider_than_buffer_stays_in_bounds() {
        let mut data: Vec<u8> = (0..2 * 3 * 3).map(|v| (v * 10) as u8).collect();
        separable_gaussian_blur(&mut data, 2, 3, 3, 51);
        assert_eq!(data.len(), 18);
    }

    #[test]
    fn test_extract_and_write_back_roundtrip() {
        let data: Vec<u8> = (0..4 * 4 * 3).map(|v| v as u8).collect();
        let rect = RoiRect { x: 1, y: 1, w: 2, h: 2 };
        let mut roi = Vec::new();
        extract_roi(&data, 4, 3, rect, &mut roi);
        assert_eq!(roi.len(), 12);
        assert_eq!(&roi[..3], &data[(4 + 1) * 3..(4 + 1) * 3 + 3]);

        let mut target = vec![0u8; data.len()];
        write_roi_back(&mut target, &roi, 4, 3, rect);
        assert_eq!(target[(2 * 4 + 2) * 3], data[(2 * 4 + 2) * 3]);
        assert_eq!(target[0], 0);
    }
}
