//! Image colorization pipeline
//!
//! The model only sees a fixed 256x256 lightness plane and predicts the two
//! chrominance planes. Steps:
//! 1. Preprocess: resize to 256x256, split into L*a*b* planes
//! 2. Pack: lightness plane -> `[1, 1, 256, 256]` tensor
//! 3. Infer: one forward pass -> `[1, 2, 256, 256]`
//! 4. Unpack: channel 0 -> a, channel 1 -> b
//! 5. Recombine: input lightness + predicted chrominance
//! 6. Postprocess: render, resize to the source size, re-extract chrominance
//!    and pair it with the full-resolution source lightness
//!
//! Lightness is never taken from the model, so detail in the source survives.

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::{Array4, ArrayD};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::debug;

use super::model::ColorizationModel;
use crate::color::LabImage;
use crate::error::ColorizeError;

/// Side length of the model's square input
pub const INPUT_DIMENSION: usize = 256;

const INPUT_SIZE: u32 = INPUT_DIMENSION as u32;
const PLANE_LEN: usize = INPUT_DIMENSION * INPUT_DIMENSION;

/// Resampling filter for every resize in the pipeline
const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Colorizes images with a shared model
#[derive(Clone)]
pub struct ImageColorizer {
    model: Arc<dyn ColorizationModel>,
}

impl ImageColorizer {
    pub fn new(model: Arc<dyn ColorizationModel>) -> Self {
        Self { model }
    }

    /// Colorize one image on a blocking worker
    ///
    /// The returned image always has the input's dimensions.
    pub async fn colorize(&self, image: DynamicImage) -> Result<DynamicImage, ColorizeError> {
        let model = Arc::clone(&self.model);
        task::spawn_blocking(move || colorize_with(model.as_ref(), &image))
            .await
            .map_err(|e| ColorizeError::Worker(e.to_string()))?
    }

    /// Colorize one image on the current thread
    pub fn colorize_blocking(&self, image: &DynamicImage) -> Result<DynamicImage, ColorizeError> {
        colorize_with(self.model.as_ref(), image)
    }

    /// Colorize several images with a single batch prediction
    ///
    /// Fails as a whole on the first error.
    pub async fn colorize_batch(
        &self,
        images: Vec<DynamicImage>,
    ) -> Result<Vec<DynamicImage>, ColorizeError> {
        let model = Arc::clone(&self.model);
        task::spawn_blocking(move || colorize_batch_with(model.as_ref(), &images))
            .await
            .map_err(|e| ColorizeError::Worker(e.to_string()))?
    }
}

fn colorize_with(
    model: &dyn ColorizationModel,
    image: &DynamicImage,
) -> Result<DynamicImage, ColorizeError> {
    let started = Instant::now();
    let source = image.to_rgb8();

    let input_lab = preprocess(&source)?;
    let input = pack(&input_lab);
    let output = model.predict(input)?;
    debug!("Inference took {:?}", started.elapsed());

    let output_lab = recombine(&input_lab, &output)?;
    let result = postprocess(&output_lab, &source)?;

    debug!(
        "Colorized {}x{} image in {:?}",
        source.width(),
        source.height(),
        started.elapsed()
    );
    Ok(DynamicImage::ImageRgb8(result))
}

fn colorize_batch_with(
    model: &dyn ColorizationModel,
    images: &[DynamicImage],
) -> Result<Vec<DynamicImage>, ColorizeError> {
    let sources: Vec<RgbImage> = images.iter().map(DynamicImage::to_rgb8).collect();
    let input_labs = sources
        .iter()
        .map(preprocess)
        .collect::<Result<Vec<_>, _>>()?;

    let inputs = input_labs.iter().map(pack).collect();
    let outputs = model.predict_batch(inputs)?;
    if outputs.len() != sources.len() {
        return Err(ColorizeError::PostprocessFailure);
    }

    sources
        .iter()
        .zip(input_labs.iter())
        .zip(outputs.iter())
        .map(|((source, input_lab), output)| {
            let output_lab = recombine(input_lab, output)?;
            postprocess(&output_lab, source).map(DynamicImage::ImageRgb8)
        })
        .collect()
}

/// Resize to the model's input size and split into L*a*b* planes
fn preprocess(source: &RgbImage) -> Result<LabImage, ColorizeError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(ColorizeError::PreprocessFailure);
    }

    let resized = imageops::resize(source, INPUT_SIZE, INPUT_SIZE, RESAMPLE_FILTER);
    let lab = LabImage::from_rgb(&resized);
    if lab.l.len() != PLANE_LEN || !lab.is_consistent() {
        return Err(ColorizeError::PreprocessFailure);
    }
    Ok(lab)
}

/// Copy the lightness plane into a `[1, 1, 256, 256]` tensor
fn pack(lab: &LabImage) -> Array4<f32> {
    let mut input = Array4::<f32>::zeros((1, 1, INPUT_DIMENSION, INPUT_DIMENSION));
    for (idx, &value) in lab.l.iter().enumerate() {
        input[[0, 0, idx / INPUT_DIMENSION, idx % INPUT_DIMENSION]] = value;
    }
    input
}

/// Unpack the predicted planes and pair them with the input lightness
fn recombine(input_lab: &LabImage, output: &ArrayD<f32>) -> Result<LabImage, ColorizeError> {
    if output.shape() != [1, 2, INPUT_DIMENSION, INPUT_DIMENSION] {
        debug!("Unexpected model output shape {:?}", output.shape());
        return Err(ColorizeError::PostprocessFailure);
    }

    let mut a = Vec::with_capacity(PLANE_LEN);
    let mut b = Vec::with_capacity(PLANE_LEN);
    for idx in 0..PLANE_LEN {
        let (row, col) = (idx / INPUT_DIMENSION, idx % INPUT_DIMENSION);
        a.push(output[[0, 0, row, col]]);
        b.push(output[[0, 1, row, col]]);
    }

    Ok(LabImage {
        width: INPUT_SIZE,
        height: INPUT_SIZE,
        l: input_lab.l.clone(),
        a,
        b,
    })
}

/// Bring the working-resolution result back to the source size
///
/// Resizing happens in RGB, so the upscaled result is converted back to
/// L*a*b* and only its chrominance is kept.
fn postprocess(output_lab: &LabImage, source: &RgbImage) -> Result<RgbImage, ColorizeError> {
    let (width, height) = source.dimensions();

    let working = output_lab.to_rgb().ok_or(ColorizeError::PostprocessFailure)?;
    let upscaled = imageops::resize(&working, width, height, RESAMPLE_FILTER);
    let result_lab = LabImage::from_rgb(&upscaled);
    let source_lab = LabImage::from_rgb(source);

    let combined = LabImage {
        width,
        height,
        l: source_lab.l,
        a: result_lab.a,
        b: result_lab.b,
    };
    combined.to_rgb().ok_or(ColorizeError::PostprocessFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use image::{GrayImage, Luma, Rgb};
    use ndarray::Axis;

    /// Predicts the same chrominance everywhere
    struct ConstantChroma {
        a: f32,
        b: f32,
    }

    impl ColorizationModel for ConstantChroma {
        fn predict(&self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
            assert_eq!(input.shape(), &[1, 1, INPUT_DIMENSION, INPUT_DIMENSION]);
            let mut output = ArrayD::<f32>::zeros(vec![1, 2, INPUT_DIMENSION, INPUT_DIMENSION]);
            output.index_axis_mut(Axis(1), 0).fill(self.a);
            output.index_axis_mut(Axis(1), 1).fill(self.b);
            Ok(output)
        }
    }

    /// Chrominance derived from lightness, so the output depends on the input
    struct LightnessDriven;

    impl ColorizationModel for LightnessDriven {
        fn predict(&self, input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
            let mut output = ArrayD::<f32>::zeros(vec![1, 2, INPUT_DIMENSION, INPUT_DIMENSION]);
            for row in 0..INPUT_DIMENSION {
                for col in 0..INPUT_DIMENSION {
                    let l = input[[0, 0, row, col]];
                    output[[0, 0, row, col]] = (l - 50.0) * 0.4;
                    output[[0, 1, row, col]] = (50.0 - l) * 0.3;
                }
            }
            Ok(output.into_dyn())
        }
    }

    struct WrongShape;

    impl ColorizationModel for WrongShape {
        fn predict(&self, _input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
            Ok(ArrayD::zeros(vec![1, 3, 128, 128]))
        }
    }

    struct Broken;

    impl ColorizationModel for Broken {
        fn predict(&self, _input: Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
            Err(ModelError::Run("boom".to_string()))
        }
    }

    fn colorizer(model: impl ColorizationModel + 'static) -> ImageColorizer {
        ImageColorizer::new(Arc::new(model))
    }

    /// Horizontal gradient with a dark square, in grayscale
    fn gradient(width: u32, height: u32) -> DynamicImage {
        let image = GrayImage::from_fn(width, height, |x, y| {
            if x > width / 4 && x < width / 2 && y > height / 4 && y < height / 2 {
                Luma([20])
            } else {
                Luma([(40 + (x * 180) / width.max(1)) as u8])
            }
        });
        DynamicImage::ImageLuma8(image)
    }

    fn lightness_at_working_size(image: &DynamicImage) -> Vec<f32> {
        let resized = imageops::resize(&image.to_rgb8(), INPUT_SIZE, INPUT_SIZE, RESAMPLE_FILTER);
        LabImage::from_rgb(&resized).l
    }

    #[tokio::test]
    async fn test_output_matches_input_dimensions() {
        let colorizer = colorizer(LightnessDriven);
        for (w, h) in [(300, 200), (64, 480), (256, 256), (1, 1)] {
            let result = colorizer.colorize(gradient(w, h)).await.unwrap();
            assert_eq!((result.width(), result.height()), (w, h));
        }
    }

    #[tokio::test]
    async fn test_lightness_is_preserved() {
        let input = gradient(320, 240);
        let result = colorizer(ConstantChroma { a: 25.0, b: -15.0 })
            .colorize(input.clone())
            .await
            .unwrap();

        let before = lightness_at_working_size(&input);
        let after = lightness_at_working_size(&result);
        let diffs: Vec<f32> = before
            .iter()
            .zip(after.iter())
            .map(|(x, y)| (x - y).abs())
            .collect();
        let worst = diffs.iter().copied().fold(0.0f32, f32::max);
        let mean = diffs.iter().sum::<f32>() / diffs.len() as f32;
        // Resampling colored edges in sRGB is not linear in lightness
        assert!(mean < 1.0, "mean lightness drift {mean}");
        assert!(worst < 6.0, "lightness drifted by {worst}");
    }

    #[tokio::test]
    async fn test_chrominance_comes_from_model() {
        let input = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 80, Luma([128])));
        let result = colorizer(ConstantChroma { a: 20.0, b: 10.0 })
            .colorize(input)
            .await
            .unwrap();

        let lab = LabImage::from_rgb(&result.to_rgb8());
        let mean = |plane: &[f32]| plane.iter().sum::<f32>() / plane.len() as f32;
        assert!((mean(&lab.l) - 53.59).abs() < 0.5);
        assert!((mean(&lab.a) - 20.0).abs() < 1.5);
        assert!((mean(&lab.b) - 10.0).abs() < 1.5);
    }

    #[test]
    fn test_repeated_calls_are_deterministic() {
        let colorizer = colorizer(LightnessDriven);
        let input = gradient(200, 150);
        let first = colorizer.colorize_blocking(&input).unwrap();
        let second = colorizer.colorize_blocking(&input).unwrap();
        assert_eq!(first.to_rgb8().as_raw(), second.to_rgb8().as_raw());
    }

    #[test]
    fn test_gray_fixture() {
        // Mid-gray in, fixed chroma out: every pixel lands on the same color
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(256, 256, Rgb([128, 128, 128])));
        let result = colorizer(ConstantChroma { a: 10.0, b: -20.0 })
            .colorize_blocking(&input)
            .unwrap()
            .to_rgb8();

        let expected = crate::color::lab_to_rgb([crate::color::rgb_to_lab([128, 128, 128])[0], 10.0, -20.0]);
        for pixel in result.pixels() {
            for c in 0..3 {
                assert!(
                    (pixel[c] as i16 - expected[c] as i16).abs() <= 1,
                    "got {:?}, expected {:?}",
                    pixel,
                    expected
                );
            }
        }
        // Blue-ish shift: b < 0 pushes blue above red and green
        assert!(expected[2] > expected[0]);
    }

    #[tokio::test]
    async fn test_empty_image_fails_preprocess() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        let err = colorizer(LightnessDriven).colorize(input).await.unwrap_err();
        assert!(matches!(err, ColorizeError::PreprocessFailure));
    }

    #[test]
    fn test_wrong_output_shape_fails_postprocess() {
        let err = colorizer(WrongShape)
            .colorize_blocking(&gradient(50, 50))
            .unwrap_err();
        assert!(matches!(err, ColorizeError::PostprocessFailure));
    }

    #[test]
    fn test_model_error_is_surfaced() {
        let err = colorizer(Broken).colorize_blocking(&gradient(50, 50)).unwrap_err();
        assert!(matches!(err, ColorizeError::Inference(ModelError::Run(_))));
    }

    #[test]
    fn test_pack_uses_row_major_layout() {
        let mut lab = LabImage {
            width: INPUT_SIZE,
            height: INPUT_SIZE,
            l: vec![0.0; PLANE_LEN],
            a: vec![0.0; PLANE_LEN],
            b: vec![0.0; PLANE_LEN],
        };
        lab.l[INPUT_DIMENSION + 3] = 42.0;
        lab.l[PLANE_LEN - 1] = 7.0;

        let packed = pack(&lab);
        assert_eq!(packed[[0, 0, 1, 3]], 42.0);
        assert_eq!(packed[[0, 0, 255, 255]], 7.0);
        assert_eq!(packed[[0, 0, 3, 1]], 0.0);
    }

    #[tokio::test]
    async fn test_batch_matches_single_calls() {
        let colorizer = colorizer(LightnessDriven);
        let images = vec![gradient(120, 90), gradient(40, 300)];

        let batch = colorizer.colorize_batch(images.clone()).await.unwrap();
        assert_eq!(batch.len(), 2);
        for (input, output) in images.iter().zip(batch.iter()) {
            let single = colorizer.colorize_blocking(input).unwrap();
            assert_eq!(single.to_rgb8().as_raw(), output.to_rgb8().as_raw());
        }
    }
}
