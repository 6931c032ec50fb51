// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// YOLO detector backed by a model executed with `rten`.
//
// Models must be converted to the `.rten` format first, e.g. from an ONNX
// export of the trained weights:
//
//   rten-convert qrcode.onnx qrcode.rten
//
// **Important:** `rten` must be compiled in release mode (or with
// `opt-level = 2` for dev profiles) for usable inference speed.

use std::path::PathBuf;

use image::RgbImage;
use pruefwerk_core::config::DetectorConfig;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use tracing::{debug, info, instrument};

use crate::detector::{Detector, PredictError, PredictParams, RawDetection};
use crate::yolo::{letterbox, postprocess, to_chw};

/// A single YOLO model with its class names.
pub struct RtenYoloDetector {
    name: String,
    model: Model,
    labels: Vec<String>,
    model_path: PathBuf,
}

impl RtenYoloDetector {
    /// Load the model named by `config`.
    ///
    /// Model loading is the expensive step. Build the detector once and
    /// share it between jobs.
    #[instrument(skip_all, fields(detector = %config.name, path = %config.model_path.display()))]
    pub fn load(config: &DetectorConfig) -> Result<Self, PredictError> {
        if !config.model_path.exists() {
            return Err(PredictError::ModelLoad(format!(
                "model not found at {}",
                config.model_path.display()
            )));
        }

        let model = Model::load_file(&config.model_path).map_err(|err| {
            PredictError::ModelLoad(format!(
                "failed to load model from {}: {}",
                config.model_path.display(),
                err
            ))
        })?;

        info!(labels = config.labels.len(), "Detector model loaded");
        Ok(Self {
            name: config.name.clone(),
            model,
            labels: config.labels.clone(),
            model_path: config.model_path.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Detector for RtenYoloDetector {
    #[instrument(skip_all, fields(detector = %self.name, size = params.inference_size))]
    fn predict(
        &self,
        image: &RgbImage,
        params: &PredictParams,
    ) -> Result<Vec<RawDetection>, PredictError> {
        let size = params.inference_size;
        let (input_image, letterboxed) = letterbox(image, size)?;

        let side = size as usize;
        let input = NdTensor::from_data([1, 3, side, side], to_chw(&input_image));

        let output: NdTensor<f32, 3> = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|err| PredictError::Inference(err.to_string()))?
            .try_into()
            .map_err(|err| PredictError::Output(format!("{err}")))?;

        let shape: Vec<usize> = output.shape().iter().copied().collect();
        let data = output.to_vec();
        debug!(?shape, "Model output received");

        postprocess(
            &shape,
            &data,
            &letterboxed,
            &self.labels,
            params.confidence_threshold,
            params.iou_threshold,
        )
    }
}

impl std::fmt::Debug for RtenYoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtenYoloDetector")
            .field("name", &self.name)
            .field("model_path", &self.model_path)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}
