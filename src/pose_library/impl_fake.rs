use crate::library::logger::interface::Logger;
use crate::pose_library::interface::{
    Keypoint, Pose, PoseEstimate, PoseLibrary, PoseModel, PoseOutput, Prediction, Webcam,
};
use crate::pose_library::readiness::{self, LibraryReadiness};
use image::{DynamicImage, Rgb, RgbImage};
use rand::distr::{Distribution, Uniform};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PARTS: [&str; 17] = [
    "nose",
    "leftEye",
    "rightEye",
    "leftEar",
    "rightEar",
    "leftShoulder",
    "rightShoulder",
    "leftElbow",
    "rightElbow",
    "leftWrist",
    "rightWrist",
    "leftHip",
    "rightHip",
    "leftKnee",
    "rightKnee",
    "leftAnkle",
    "rightAnkle",
];

#[derive(Debug, Clone)]
pub struct PoseLibraryFakeConfig {
    pub class_labels: Vec<String>,
    pub readiness_delay: Duration,
    pub load_delay: Duration,
    pub fail_load: bool,
    pub fail_camera: bool,
}

impl Default for PoseLibraryFakeConfig {
    fn default() -> Self {
        Self {
            class_labels: vec![
                "Wave".to_string(),
                "T-Pose".to_string(),
                "Squat".to_string(),
                "Star Jump".to_string(),
            ],
            readiness_delay: Duration::from_millis(300),
            load_delay: Duration::from_secs(1),
            fail_load: false,
            fail_camera: false,
        }
    }
}

impl PoseLibraryFakeConfig {
    #[allow(dead_code)]
    pub fn instant() -> Self {
        Self {
            readiness_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Simulated pose library. Serves the configured labels and random
/// predictions so the game runs without a real network.
pub struct PoseLibraryFake {
    config: PoseLibraryFakeConfig,
    logger: Arc<dyn Logger + Send + Sync>,
}

impl PoseLibraryFake {
    pub fn new(config: PoseLibraryFakeConfig, logger: Arc<dyn Logger + Send + Sync>) -> Self {
        Self {
            config,
            logger: logger.with_namespace("pose_library").with_namespace("fake"),
        }
    }

    /// Brings the library up in the background after `readiness_delay`.
    pub fn spawn_ready(
        config: PoseLibraryFakeConfig,
        logger: Arc<dyn Logger + Send + Sync>,
    ) -> LibraryReadiness {
        let (signal, readiness) = readiness::channel();
        std::thread::spawn(move || {
            std::thread::sleep(config.readiness_delay);
            signal.ready(Arc::new(PoseLibraryFake::new(config, logger)));
        });
        readiness
    }
}

impl PoseLibrary for PoseLibraryFake {
    fn load(
        &self,
        model_url: &str,
        metadata_url: &str,
    ) -> Result<Arc<dyn PoseModel + Send + Sync>, Box<dyn std::error::Error + Send + Sync>> {
        self.logger
            .info(&format!("Loading model {} ({})", model_url, metadata_url))?;
        std::thread::sleep(self.config.load_delay);

        if self.config.fail_load {
            return Err(format!("failed to fetch {}", model_url).into());
        }

        self.logger.info(&format!(
            "Model loaded with classes {:?}",
            self.config.class_labels
        ))?;

        Ok(Arc::new(PoseModelFake {
            class_labels: self.config.class_labels.clone(),
        }))
    }

    fn create_webcam(&self, width: u32, height: u32, flip: bool) -> Arc<dyn Webcam + Send + Sync> {
        Arc::new(WebcamFake {
            width,
            height,
            flip,
            fail_setup: self.config.fail_camera,
            logger: self.logger.with_namespace("webcam"),
            state: Mutex::new(WebcamState::default()),
        })
    }
}

pub struct PoseModelFake {
    class_labels: Vec<String>,
}

impl PoseModel for PoseModelFake {
    fn class_labels(&self) -> Vec<String> {
        self.class_labels.clone()
    }

    fn estimate_pose(
        &self,
        frame: &DynamicImage,
    ) -> Result<PoseEstimate, Box<dyn std::error::Error + Send + Sync>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err("empty frame".into());
        }

        let mut rng = rand::rng();
        let x_dist = Uniform::new(0.0, frame.width() as f32)?;
        let y_dist = Uniform::new(0.0, frame.height() as f32)?;
        let score_dist = Uniform::new(0.0, 1.0)?;

        let keypoints: Vec<Keypoint> = PARTS
            .iter()
            .map(|part| Keypoint {
                part: part.to_string(),
                x: x_dist.sample(&mut rng),
                y: y_dist.sample(&mut rng),
                score: score_dist.sample(&mut rng),
            })
            .collect();

        let score = keypoints.iter().map(|k| k.score).sum::<f32>() / keypoints.len() as f32;
        let output = keypoints
            .iter()
            .flat_map(|k| [k.x / frame.width() as f32, k.y / frame.height() as f32])
            .collect();

        Ok(PoseEstimate {
            pose: Some(Pose { score, keypoints }),
            output: PoseOutput(output),
        })
    }

    fn predict(
        &self,
        output: &PoseOutput,
    ) -> Result<Vec<Prediction>, Box<dyn std::error::Error + Send + Sync>> {
        if output.0.is_empty() || self.class_labels.is_empty() {
            return Ok(vec![]);
        }

        let mut rng = rand::rng();
        let index_dist = Uniform::new(0, self.class_labels.len())?;
        let dominant_dist = Uniform::new(0.3, 1.0)?;

        let dominant = index_dist.sample(&mut rng);
        let dominant_probability: f32 = dominant_dist.sample(&mut rng);
        let rest = if self.class_labels.len() > 1 {
            (1.0 - dominant_probability) / (self.class_labels.len() - 1) as f32
        } else {
            0.0
        };

        Ok(self
            .class_labels
            .iter()
            .enumerate()
            .map(|(i, label)| Prediction {
                class_name: label.clone(),
                probability: if i == dominant {
                    dominant_probability
                } else {
                    rest
                },
            })
            .collect())
    }
}

#[derive(Default)]
struct WebcamState {
    is_setup: bool,
    is_playing: bool,
    frame_count: u32,
    canvas: Option<DynamicImage>,
}

pub struct WebcamFake {
    width: u32,
    height: u32,
    flip: bool,
    fail_setup: bool,
    logger: Arc<dyn Logger + Send + Sync>,
    state: Mutex<WebcamState>,
}

impl WebcamFake {
    fn render_frame(&self, frame_count: u32) -> DynamicImage {
        let shift = frame_count % 256;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x * 255 / self.width.max(1)) + shift) % 256;
            let g = (y * 255 / self.height.max(1)) % 256;
            Rgb([r as u8, g as u8, 96])
        });
        let image = DynamicImage::ImageRgb8(image);
        if self.flip {
            image.fliph()
        } else {
            image
        }
    }
}

impl Webcam for WebcamFake {
    fn setup(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.logger.info("Setting up webcam...")?;
        if self.fail_setup {
            return Err("camera permission denied".into());
        }
        let mut state = self.state.lock().map_err(|_| "webcam lock poisoned")?;
        state.is_setup = true;
        self.logger.info("Webcam set up")?;
        Ok(())
    }

    fn play(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock().map_err(|_| "webcam lock poisoned")?;
        if !state.is_setup {
            return Err("webcam is not set up".into());
        }
        state.is_playing = true;
        state.canvas = Some(self.render_frame(state.frame_count));
        self.logger.info("Webcam playing")?;
        Ok(())
    }

    fn update(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock().map_err(|_| "webcam lock poisoned")?;
        if !state.is_playing {
            return Err("webcam is not playing".into());
        }
        state.frame_count = state.frame_count.wrapping_add(1);
        state.canvas = Some(self.render_frame(state.frame_count));
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut state = self.state.lock().map_err(|_| "webcam lock poisoned")?;
        state.is_playing = false;
        state.is_setup = false;
        self.logger.info("Webcam stopped")?;
        Ok(())
    }

    fn canvas(&self) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
        let state = self.state.lock().map_err(|_| "webcam lock poisoned")?;
        state.canvas.clone().ok_or_else(|| "webcam has no frame".into())
    }
}
