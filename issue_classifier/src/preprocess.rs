use crate::config::TensorLayout;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error decoding image: {0}")]
    Decode(String),
}

/// Turns raw upload bytes into a batch of one `f32` image tensor scaled to
/// `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransform {
    pub image_size: u32,
    pub layout: TensorLayout,
}

impl ImageTransform {
    pub fn new(image_size: u32, layout: TensorLayout) -> Self {
        Self { image_size, layout }
    }

    pub fn input_shape(&self) -> [usize; 4] {
        let size = self.image_size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        }
    }

    pub fn transform(&self, image_data: &[u8]) -> Result<Array<f32, Ix4>, PreprocessError> {
        let image = decode_image(image_data)?;
        Ok(self.to_tensor(&image))
    }

    pub fn to_tensor(&self, image: &DynamicImage) -> Array<f32, Ix4> {
        let rgb = image
            .resize_exact(self.image_size, self.image_size, FilterType::CatmullRom)
            .to_rgb8();

        let mut input = Array::zeros(self.input_shape());
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let x = x as usize;
            let y = y as usize;
            for (c, value) in pixel.0.iter().enumerate() {
                let value = *value as f32 / 255.;
                match self.layout {
                    TensorLayout::Nhwc => input[[0, y, x, c]] = value,
                    TensorLayout::Nchw => input[[0, c, y, x]] = value,
                }
            }
        }

        input
    }

    /// All-zero input of the expected shape, fed to the model once at startup.
    pub fn blank_input(&self) -> Array<f32, Ix4> {
        Array::zeros(self.input_shape())
    }
}

fn decode_image(image_data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;

    image_reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
    use std::io::Cursor;

    fn encode(img: impl Into<DynamicImage>) -> Vec<u8> {
        let img: DynamicImage = img.into();
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_transform_nhwc() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 60, Rgb([255, 0, 51]));
        let transform = ImageTransform::new(224, TensorLayout::Nhwc);

        let input = transform.transform(&encode(img)).unwrap();

        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert!((input[[0, 10, 20, 0]] - 1.0).abs() < 1e-6);
        assert!(input[[0, 10, 20, 1]].abs() < 1e-6);
        assert!((input[[0, 10, 20, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_transform_nchw() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(32, 32, Rgb([0, 255, 0]));
        let transform = ImageTransform::new(64, TensorLayout::Nchw);

        let input = transform.transform(&encode(img)).unwrap();

        assert_eq!(input.shape(), &[1, 3, 64, 64]);
        assert!(input[[0, 0, 5, 5]].abs() < 1e-6);
        assert!((input[[0, 1, 5, 5]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_dropped_and_grayscale_expanded() {
        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(16, 16, Rgba([255, 255, 255, 0]));
        let gray = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(16, 16, Luma([255]));
        let transform = ImageTransform::new(8, TensorLayout::Nhwc);

        let from_rgba = transform.transform(&encode(rgba)).unwrap();
        let from_gray = transform.transform(&encode(gray)).unwrap();

        assert_eq!(from_rgba.shape(), &[1, 8, 8, 3]);
        assert_eq!(from_rgba, from_gray);
        assert!(from_gray.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_values_are_scaled_to_unit_range() {
        let img = ImageBuffer::from_fn(50, 50, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, 128]));
        let transform = ImageTransform::new(224, TensorLayout::Nhwc);

        let input = transform.transform(&encode(img)).unwrap();

        assert!(input.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let img = ImageBuffer::from_fn(37, 91, |x, y| Rgb([(x * 7) as u8, (y * 3) as u8, 9]));
        let bytes = encode(img);
        let transform = ImageTransform::new(224, TensorLayout::Nhwc);

        let first = transform.transform(&bytes).unwrap();
        let second = transform.transform(&bytes).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let transform = ImageTransform::new(224, TensorLayout::Nhwc);
        let result = transform.transform(b"definitely not an image");

        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }
}
