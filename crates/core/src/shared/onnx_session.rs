use std::path::Path;

/// Return the preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU when a listed provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Opens an inference session for `model_path` with full graph optimisation.
///
/// `intra_threads` of `None` uses every available core; pipelines running
/// several cameras should pass a smaller share.
pub fn load_session(
    model_path: &Path,
    intra_threads: Option<usize>,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    if !model_path.is_file() {
        return Err(format!("model file not found: {}", model_path.display()).into());
    }
    let intra_threads = intra_threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads.max(1))?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    log::debug!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported_by_path() {
        let err = load_session(Path::new("/nonexistent/model.onnx"), Some(1)).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/model.onnx"));
    }

    #[test]
    fn test_invalid_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();
        assert!(load_session(&path, Some(1)).is_err());
    }
}
