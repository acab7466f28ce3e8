//! rollcall-core — face analysis and liveness logic.
//!
//! SCRFD detection, ArcFace encoding and 68-point landmarks run via ONNX
//! Runtime behind the [`FaceModel`] trait. Liveness checks and registry
//! matching are pure functions over the model's outputs.

pub mod alignment;
pub mod detector;
pub mod landmarker;
pub mod liveness;
pub mod matcher;
pub mod model;
pub mod onnx;
pub mod recognizer;
pub mod types;

pub use liveness::{BlinkGate, EnrollStep, EnrollmentSession, LivenessConfig};
pub use matcher::{nearest_match, Match};
pub use model::{FaceModel, ModelError};
pub use onnx::{default_model_dir, OnnxFaceModel};
pub use types::{Encoding, FaceBox, FaceLandmarks, Point};
