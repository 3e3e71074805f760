pub mod correlation_tracker;
pub mod model_resolver;
pub mod onnx_yolo_locator;
