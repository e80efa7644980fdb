pub mod descriptor;
pub mod embedding_cache;
pub mod embedding_extractor;
pub mod face_crop;
pub mod match_service;
pub mod recognition_dispatcher;
pub mod recognizer;
