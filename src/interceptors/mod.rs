use async_trait::async_trait;
use std::fmt::Debug;

/// Sink for prompt/response pairs, e.g. to audit generated questions later.
#[async_trait]
pub trait Interceptor: Send + Sync + Debug {
    async fn save(&self, prompt: &str, response: &str) -> std::io::Result<()>;
}

pub mod file;
pub use file::FileInterceptor;
