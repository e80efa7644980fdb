pub mod http_match_client;
pub mod onnx_embedding_extractor;
pub mod worker_pool_dispatcher;
