use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, ArrayView4};

/// Side length of the square input the classifier was trained on.
pub const INPUT_SIZE: usize = 224;
pub const CHANNELS: usize = 3;
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, CHANNELS];

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Expected input shape {expected:?}, got {actual:?}")]
    Shape {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
}

/// Batched NHWC image tensor with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(Array4<f32>);

impl InputTensor {
    pub fn from_array(array: Array4<f32>) -> Result<Self, PreprocessError> {
        if array.shape() != INPUT_SHAPE {
            return Err(PreprocessError::Shape {
                expected: INPUT_SHAPE,
                actual: array.shape().to_vec(),
            });
        }
        Ok(Self(array.as_standard_layout().into_owned()))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    /// Row-major copy of the tensor data.
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

pub struct Preprocessor {
    filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        // Nearest matches the sampling the model saw at training time.
        Self {
            filter: FilterType::Nearest,
        }
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    pub fn process_bytes(&self, bytes: &[u8]) -> Result<InputTensor, PreprocessError> {
        let image = image::load_from_memory(bytes)?;
        Ok(self.process_image(&image))
    }

    /// Stretches to the input size without keeping the aspect ratio, then
    /// scales each channel by 1/255.
    pub fn process_image(&self, image: &DynamicImage) -> InputTensor {
        let side = INPUT_SIZE as u32;
        let rgb = image.resize_exact(side, side, self.filter).to_rgb8();

        let array = Array4::from_shape_fn(INPUT_SHAPE, |(_, y, x, c)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
        });
        InputTensor(array)
    }
}
