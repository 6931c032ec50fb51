// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pruefwerk-detect: Object detection for the Pruefwerk inspector.
//
// Defines the `Detector` contract, the ensemble that runs several detectors
// over one page, and YOLO pre/post-processing. The `rten` model backend is
// behind the "yolo" feature gate.

pub mod detector;
pub mod ensemble;
pub mod yolo;

pub use detector::{Detector, PredictError, PredictParams, RawDetection};
pub use ensemble::{DEFAULT_INFERENCE_SIZE, DetectorEnsemble, EnsembleMember, IOU_THRESHOLD};

#[cfg(feature = "yolo")]
pub use yolo::RtenYoloDetector;
