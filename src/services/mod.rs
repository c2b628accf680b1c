pub mod chunk_decoder;
pub mod path_resolver;
pub mod storage_service;
