mod blob_storage;

#[cfg(feature = "s3-storage")]
pub use blob_storage::S3BlobStorage;
pub use blob_storage::{
    BlobStorage, BlobStorageError, BlobStorageResult, FilesystemBlobStorage, create_blob_storage,
};
