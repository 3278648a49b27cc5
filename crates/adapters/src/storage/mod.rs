//! Object storage adapters.
//!
//! All three profiles drive the same [`store::StoreCore`], which wraps an
//! `object_store` backend; they differ only in how the backend is built from
//! config. The macro below stamps out the trait impl for each profile.

mod azure;
mod minio;
mod s3;
mod store;

pub use azure::AzureBlobAdapter;
pub use minio::MinioAdapter;
pub use s3::S3Adapter;

macro_rules! delegate_object_storage {
    ($adapter:ty) => {
        #[async_trait::async_trait]
        impl cloudlift_interfaces::ObjectStorage for $adapter {
            async fn put_object(
                &self,
                key: &str,
                data: bytes::Bytes,
                content_type: Option<&str>,
                metadata: Option<&std::collections::BTreeMap<String, String>>,
            ) -> Result<String, cloudlift_core::InfrastructureError> {
                self.core.put_object(key, data, content_type, metadata).await
            }

            async fn get_object(
                &self,
                key: &str,
            ) -> Result<bytes::Bytes, cloudlift_core::InfrastructureError> {
                self.core.get_object(key).await
            }

            async fn get_object_stream(
                &self,
                key: &str,
            ) -> Result<cloudlift_interfaces::ByteStream, cloudlift_core::InfrastructureError>
            {
                self.core.get_object_stream(key).await
            }

            async fn delete_object(
                &self,
                key: &str,
            ) -> Result<(), cloudlift_core::InfrastructureError> {
                self.core.delete_object(key).await
            }

            async fn object_exists(
                &self,
                key: &str,
            ) -> Result<bool, cloudlift_core::InfrastructureError> {
                self.core.object_exists(key).await
            }

            async fn get_object_metadata(
                &self,
                key: &str,
            ) -> Result<cloudlift_interfaces::ObjectMetadata, cloudlift_core::InfrastructureError>
            {
                self.core.get_object_metadata(key).await
            }

            async fn list_objects(
                &self,
                prefix: Option<&str>,
                limit: Option<usize>,
            ) -> Result<
                Vec<cloudlift_interfaces::ObjectMetadata>,
                cloudlift_core::InfrastructureError,
            > {
                self.core.list_objects(prefix, limit).await
            }

            async fn generate_presigned_url(
                &self,
                key: &str,
                expiration_secs: u64,
                method: cloudlift_interfaces::PresignMethod,
            ) -> Result<String, cloudlift_core::InfrastructureError> {
                self.core.generate_presigned_url(key, expiration_secs, method).await
            }

            async fn copy_object(
                &self,
                from: &str,
                to: &str,
            ) -> Result<(), cloudlift_core::InfrastructureError> {
                self.core.copy_object(from, to).await
            }

            async fn health_check(&self) -> bool {
                self.core.health_check().await
            }
        }
    };
}

pub(crate) use delegate_object_storage;
