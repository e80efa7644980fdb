pub mod recognition_policy;
pub mod track_state;
pub mod track_store;
