use crate::{
    config::ModelConfig,
    model_service::{ModelError, ModelService},
};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrtServiceError {
    #[error("failed to initialise onnxruntime: {0}")]
    Init(String),
    #[error("failed to load model {path}: {message}")]
    Load { path: String, message: String },
    #[error("model {0} declares no outputs")]
    NoOutput(String),
}

/// ONNX Runtime backed classifier. Holds a small pool of sessions so that
/// concurrent requests do not queue behind a single one.
pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, OrtServiceError> {
        init_runtime()?;

        let path = model_config.get_path();
        let sessions = (0..model_config.num_instances.max(1))
            .map(|_| {
                let session = load_session(path).map_err(|message| OrtServiceError::Load {
                    path: path.display().to_string(),
                    message,
                })?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, OrtServiceError>>()?;

        let (output_name, inputs) = {
            let first = sessions[0]
                .lock()
                .map_err(|e| OrtServiceError::Init(e.to_string()))?;
            let output_name = first
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| OrtServiceError::NoOutput(path.display().to_string()))?;
            let inputs = first
                .inputs
                .iter()
                .map(|input| format!("{}: {:?}", input.name, input.input_type))
                .collect::<Vec<_>>();
            (output_name, inputs)
        };

        tracing::info!(
            "Created {} ONNX sessions from {}",
            sessions.len(),
            path.display()
        );
        tracing::info!("Model inputs: {:?}, scores read from `{}`", inputs, output_name);

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            output_name,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ModelError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (_, scores) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Extract(e.to_string()))?;

        Ok(scores.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        self.run_inference(input)
    }
}

fn load_session(path: &Path) -> Result<Session, String> {
    Session::builder()
        .map_err(|e| e.to_string())?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| e.to_string())?
        .commit_from_file(path)
        .map_err(|e| e.to_string())
}

#[cfg(feature = "cuda")]
fn init_runtime() -> Result<(), OrtServiceError> {
    ort::init()
        .with_execution_providers([
            ort::execution_providers::CUDAExecutionProvider::default().build()
        ])
        .commit()
        .map_err(|e| OrtServiceError::Init(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "cuda"))]
fn init_runtime() -> Result<(), OrtServiceError> {
    Ok(())
}
