pub mod default_component_factory;
pub mod threaded_pipeline_executor;
