//! Object storage backends the gateway forwards to

mod memory;
mod sdk;
mod traits;


pub use memory::MemoryBackend;
pub use sdk::{normalize_wasabi_endpoint, SdkBackend};
pub use traits::{
    CompleteMultipartOutput, CompletedPart, CreateMultipartOutput, GetObjectOutput,
    ListObjectsRequest, ListPage, ListUploadsRequest, ObjectBackend, ObjectBody, ObjectHeaders,
    ObjectMetadata, ObjectSummary, PutObjectOutput, UploadSummary, UploadsPage, WebsiteConfig,
};
