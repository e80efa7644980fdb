pub mod bounding_box;
pub mod camera_config;
pub mod constants;
pub mod frame;
pub mod onnx_session;
pub mod stream_metadata;
