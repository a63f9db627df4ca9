//! Model Server Common Types
//!
//! Wire types shared by every protocol surface of the model server: the v1
//! (model-defined JSON) protocol, the v2 (typed tensor) protocol and the
//! model repository extension.

pub mod repository;
pub mod v1;
pub mod v2;

pub use repository::{LoadResponse, ModelState, RepositoryIndexEntry, UnloadResponse};
pub use v1::{LiveResponse, ModelReadyResponse, ModelsResponse};
pub use v2::{
    DataType, InferTensor, InferenceRequest, InferenceResponse, ModelMetadata, RequestedOutput,
    ServerLiveResponse, ServerMetadata, ServerReadyResponse, TensorError, TensorMetadata,
};
