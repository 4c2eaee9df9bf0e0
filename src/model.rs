use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::ValueEnum;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, GrayImage, RgbImage};
use log::{debug, info};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::{
    errors::{CutoutError, Result},
    traits::BackgroundRemover,
};

/// Model family of the ONNX file. Decides the input normalisation and the
/// input size used when the model does not declare a static one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelKind {
    U2net,
    U2netp,
    U2netHumanSeg,
    Silueta,
    IsnetGeneralUse,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

const IMAGENET: Normalization = Normalization {
    mean: [0.485, 0.456, 0.406],
    std: [0.229, 0.224, 0.225],
};

const CENTERED: Normalization = Normalization {
    mean: [0.5, 0.5, 0.5],
    std: [1.0, 1.0, 1.0],
};

impl ModelKind {
    pub const fn normalization(self) -> Normalization {
        match self {
            Self::IsnetGeneralUse => CENTERED,
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => IMAGENET,
        }
    }

    pub const fn default_image_size(self) -> u32 {
        match self {
            Self::IsnetGeneralUse => 1024,
            Self::U2net | Self::U2netp | Self::U2netHumanSeg | Self::Silueta => 320,
        }
    }
}

struct LoadedModel {
    session: Session,
    input_name: String,
    output_name: String,
    image_size: u32,
}

/// [`BackgroundRemover`] backed by an ONNX Runtime session.
///
/// The session is created on the first prediction, so constructing an
/// `OnnxRemover` never touches the model file.
pub struct OnnxRemover {
    model_path: PathBuf,
    kind: ModelKind,
    device_id: i32,
    model: Mutex<Option<LoadedModel>>,
}

fn model_error<E: Display>(operation: impl Into<String>) -> impl FnOnce(E) -> CutoutError {
    let operation = operation.into();
    move |e| CutoutError::removal(operation, e.to_string())
}

impl OnnxRemover {
    pub fn new(model_path: impl Into<PathBuf>, kind: ModelKind, device_id: i32) -> Self {
        Self {
            model_path: model_path.into(),
            kind,
            device_id,
            model: Mutex::new(None),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Input size of the loaded model, `None` until the first prediction.
    pub fn image_size(&self) -> Option<u32> {
        self.model.lock().as_ref().map(|model| model.image_size)
    }

    fn load(&self) -> Result<LoadedModel> {
        if !self.model_path.is_file() {
            return Err(CutoutError::removal(
                "model loading",
                format!("model file not found: {}", self.model_path.display()),
            ));
        }

        let started = Instant::now();
        let session = SessionBuilder::new()
            .map_err(model_error("session builder initialisation"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
            ])
            .map_err(model_error("execution provider registration"))?
            .with_memory_pattern(true)
            .map_err(model_error("memory pattern configuration"))?
            .commit_from_file(&self.model_path)
            .map_err(model_error(format!(
                "model loading: {}",
                self.model_path.display()
            )))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| CutoutError::removal("model inspection", "model has no inputs"))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| CutoutError::removal("model inspection", "model has no outputs"))?;
        let input_name = input.name.clone();

        // dynamic axes are reported as -1
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&size| size > 0)
            .map(|size| size as u32)
            .unwrap_or_else(|| self.kind.default_image_size());

        info!(
            "loaded {:?} model from {} in {:.2?} (input `{}` {}x{}, output `{}`)",
            self.kind,
            self.model_path.display(),
            started.elapsed(),
            input_name,
            image_size,
            image_size,
            output_name
        );

        Ok(LoadedModel {
            session,
            input_name,
            output_name,
            image_size,
        })
    }

    fn infer(model: &mut LoadedModel, tensor: Array4<f32>) -> Result<Array4<f32>> {
        let tensor = tensor.as_standard_layout();
        let input =
            TensorRef::from_array_view(&tensor).map_err(model_error("input tensor creation"))?;
        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input])
            .map_err(model_error("inference"))?;
        let prediction = outputs[model.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(model_error("output extraction"))?;
        Ok(prediction.into_dimensionality::<Ix4>()?.to_owned())
    }
}

impl BackgroundRemover for OnnxRemover {
    fn predict_mask(&self, img: &DynamicImage) -> Result<GrayImage> {
        let mut guard = self.model.lock();
        let model = match guard.take() {
            Some(model) => model,
            None => self.load()?,
        };
        let model = guard.insert(model);

        let tensor = preprocess(&img.to_rgb8(), model.image_size, self.kind.normalization());
        let started = Instant::now();
        let prediction = Self::infer(model, tensor)?;
        debug!(
            "inference took {:.2?}, prediction shape {:?}",
            started.elapsed(),
            prediction.shape()
        );

        let (width, height) = img.dimensions();
        postprocess_mask(prediction.slice(s![0, 0, .., ..]), width, height)
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

/// Turn an RGB image into the `[1, 3, size, size]` tensor the model expects.
///
/// Values are divided by the brightest channel value of the resized image
/// before the mean/std normalisation. The result is in standard (C) layout,
/// which ort requires to borrow it as a tensor.
pub fn preprocess(image: &RgbImage, image_size: u32, normalization: Normalization) -> Array4<f32> {
    let image = imageops::resize(image, image_size, image_size, FilterType::Lanczos3);
    let max = image.as_raw().iter().copied().max().unwrap_or(0);
    let max = f32::from(max).max(1e-6);

    let mut tensor = image.as_ndarray3().mapv(|v| f32::from(v) / max);
    for (channel, mut plane) in tensor.outer_iter_mut().enumerate() {
        let mean = normalization.mean[channel];
        let std = normalization.std[channel];
        plane.mapv_inplace(|v| (v - mean) / std);
    }
    // as_ndarray3 is a permuted view of the interleaved pixels
    tensor.insert_axis(Axis(0)).as_standard_layout().into_owned()
}

/// Min-max normalise a raw prediction into a mask and scale it back to
/// `width` x `height`.
pub fn postprocess_mask(prediction: ArrayView2<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let (rows, cols) = prediction.dim();
    if rows == 0 || cols == 0 {
        return Err(CutoutError::removal(
            "mask postprocessing",
            "model returned an empty prediction",
        ));
    }

    let (min, max) = prediction
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(f32::EPSILON);

    let pixels = prediction
        .iter()
        .map(|&v| ((v - min) / range * 255.0).clamp(0.0, 255.0) as u8)
        .collect();
    let mask = GrayImage::from_raw(cols as u32, rows as u32, pixels).ok_or_else(|| {
        CutoutError::removal(
            "mask postprocessing",
            format!("prediction of shape {rows}x{cols} does not form an image"),
        )
    })?;

    if mask.dimensions() == (width, height) {
        return Ok(mask);
    }
    Ok(imageops::resize(&mask, width, height, FilterType::Lanczos3))
}
