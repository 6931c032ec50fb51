// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pruefwerk-inspect: inspection jobs for the Pruefwerk inspector.
//
// Ties rasterization, detection and annotation together into single-document
// and ZIP batch jobs, assembles their JSON reports and stores the generated
// artifacts.

pub mod archive;
pub mod assemble;
pub mod inspector;
pub mod service;
pub mod storage;

pub use assemble::{AnalysisReport, AnnotationCounter, BatchEntry, BatchReport, DocumentAnnotations};
pub use inspector::Inspector;
pub use service::InspectionService;
pub use storage::{ArtifactStore, JobArtifacts};
