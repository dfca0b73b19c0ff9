use image::DynamicImage;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub part: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

/// Intermediate network output handed from `estimate_pose` to `predict`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseOutput(pub Vec<f32>);

#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    pub pose: Option<Pose>,
    pub output: PoseOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

pub trait PoseModel {
    fn class_labels(&self) -> Vec<String>;
    fn estimate_pose(
        &self,
        frame: &DynamicImage,
    ) -> Result<PoseEstimate, Box<dyn std::error::Error + Send + Sync>>;
    fn predict(
        &self,
        output: &PoseOutput,
    ) -> Result<Vec<Prediction>, Box<dyn std::error::Error + Send + Sync>>;
}

pub trait Webcam {
    fn setup(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn play(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Pulls the next camera frame onto the canvas.
    fn update(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// The current frame as last pulled by `update`.
    fn canvas(&self) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>>;
}

pub trait PoseLibrary {
    fn load(
        &self,
        model_url: &str,
        metadata_url: &str,
    ) -> Result<Arc<dyn PoseModel + Send + Sync>, Box<dyn std::error::Error + Send + Sync>>;
    fn create_webcam(&self, width: u32, height: u32, flip: bool) -> Arc<dyn Webcam + Send + Sync>;
}

/// Probability assigned to `label`, if the model reported it.
pub fn probability_of(predictions: &[Prediction], label: &str) -> Option<f32> {
    predictions
        .iter()
        .find(|p| p.class_name == label)
        .map(|p| p.probability)
}
