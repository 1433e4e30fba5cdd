//! Short identifier allocation

use std::sync::Arc;

use imgnow_core::identifier::{
    generate_identifier, validate_requested_identifier, DEFAULT_IDENTIFIER_LEN,
    WIDENED_IDENTIFIER_LEN,
};
use imgnow_core::AppError;
use imgnow_db::FileRepository;

/// Random draws per identifier length before widening or giving up.
pub const ATTEMPTS_PER_LENGTH: u32 = 8;

type Generator = dyn Fn(usize) -> String + Send + Sync;

/// Hands out unused identifiers, either the caller's own or a random short one.
///
/// Generated identifiers start at 5 characters; after repeated collisions the
/// allocator widens to 8, and past that it fails with `AllocationExhausted`.
/// The check is advisory: the record insert is the final arbiter of uniqueness.
#[derive(Clone)]
pub struct IdentifierAllocator {
    repository: Arc<dyn FileRepository>,
    generate: Arc<Generator>,
}

impl IdentifierAllocator {
    pub fn new(repository: Arc<dyn FileRepository>) -> Self {
        Self {
            repository,
            generate: Arc::new(generate_identifier),
        }
    }

    /// Replace the random source; lets tests force collisions.
    pub fn with_generator(
        mut self,
        generate: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.generate = Arc::new(generate);
        self
    }

    /// Reserve `requested` verbatim, or generate an identifier when none was asked for.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(&self, requested: Option<&str>) -> Result<String, AppError> {
        match requested.filter(|id| !id.is_empty()) {
            Some(id) => self.claim_requested(id).await,
            None => self.generate_unused().await,
        }
    }

    async fn claim_requested(&self, identifier: &str) -> Result<String, AppError> {
        validate_requested_identifier(identifier)?;

        if self.repository.identifier_exists(identifier).await? {
            return Err(AppError::Conflict(format!(
                "Identifier '{}' is already taken",
                identifier
            )));
        }
        Ok(identifier.to_string())
    }

    async fn generate_unused(&self) -> Result<String, AppError> {
        let mut attempts = 0u32;

        for len in [DEFAULT_IDENTIFIER_LEN, WIDENED_IDENTIFIER_LEN] {
            for _ in 0..ATTEMPTS_PER_LENGTH {
                attempts += 1;
                let candidate = (self.generate)(len);
                if !self.repository.identifier_exists(&candidate).await? {
                    if attempts > 1 {
                        tracing::debug!(attempts, len, "Identifier allocated after collisions");
                    }
                    return Ok(candidate);
                }
            }
            tracing::warn!(len, attempts, "Identifier space crowded, widening");
        }

        tracing::error!(attempts, "Identifier allocation exhausted");
        Err(AppError::AllocationExhausted { attempts })
    }
}
