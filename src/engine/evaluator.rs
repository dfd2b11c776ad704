#[cfg(test)]
use mockall::automock;

use crate::model::Attestation;
use crate::Result;

/// Evaluates attestation query-language predicates
#[cfg_attr(test, automock)]
pub trait QueryEvaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        predicate: &str,
        attestation: &Attestation,
    ) -> Result<bool>;
}

/// Embedding similarity check between a query text and an attestation
#[cfg_attr(test, automock)]
pub trait SimilarityEvaluator: Send + Sync + 'static {
    fn evaluate(
        &self,
        query: &str,
        threshold: f32,
        cluster_id: Option<i64>,
        attestation: &Attestation,
    ) -> Result<bool>;
}
