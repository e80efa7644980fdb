pub mod class_filter;
pub mod detection;
pub mod object_detector;
