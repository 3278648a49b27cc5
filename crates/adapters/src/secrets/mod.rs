//! Secrets manager adapters.

mod aws;
mod environment;
mod key_vault;

pub use aws::AwsSecretsManagerAdapter;
pub use environment::EnvironmentSecretsAdapter;
pub use key_vault::AzureKeyVaultAdapter;
