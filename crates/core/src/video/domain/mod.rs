pub mod stream_reader;
pub mod stream_writer;
