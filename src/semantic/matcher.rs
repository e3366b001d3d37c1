//! Brute-force cosine matcher over an in-memory reference collection.
//!
//! Similarity is the plain dot product: every vector handed to the matcher
//! is expected to be unit-normalized already, and the matcher never
//! re-normalizes. Selection is threshold-first with a top-k fallback, so a
//! non-empty collection always yields at least one match.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::Embedding;

/// Collections at least this large score their entries on the rayon pool.
const PARALLEL_SCORING_MIN: usize = 4096;

/// Reference metadata carried into the output. Not used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// One ranked reference entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub reference_id: String,
    pub text: String,
    pub similarity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("dimension mismatch: query has {expected} dimensions, reference #{index} has {got}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        index: usize,
    },

    #[error("reference set is empty")]
    EmptyReferenceSet,

    #[error("invalid embedding: {}", describe_source(.index))]
    InvalidEmbedding { index: Option<usize> },

    #[error("{embeddings} reference embeddings but {entries} reference entries")]
    MisalignedReferences { embeddings: usize, entries: usize },

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("threshold must be a number within [-1, 1], got {0}")]
    InvalidThreshold(f32),
}

fn describe_source(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!("reference #{index} contains non-finite values"),
        None => "query contains non-finite values".to_string(),
    }
}

/// Rank `reference_embeddings` against `query_embedding`.
///
/// Entries with `similarity >= threshold` are returned best first, capped at
/// `top_k`. When none qualifies, the `top_k` best entries are returned
/// regardless of threshold. Equal similarities keep collection order.
pub fn find_matches<E>(
    query_embedding: &[f32],
    reference_embeddings: &[E],
    reference_entries: &[ReferenceEntry],
    threshold: f32,
    top_k: usize,
) -> Result<Vec<Match>, MatchError>
where
    E: AsRef<[f32]> + Sync,
{
    validate(
        query_embedding,
        reference_embeddings,
        reference_entries,
        threshold,
        top_k,
    )?;

    let similarities = score(query_embedding, reference_embeddings);

    let mut selected: Vec<usize> = (0..similarities.len())
        .filter(|&i| similarities[i] >= threshold)
        .collect();

    if selected.is_empty() {
        selected = (0..similarities.len()).collect();
    }

    // Candidates are in index order and the sort is stable, so ties stay
    // index-ascending.
    selected.sort_by(|&a, &b| similarities[b].total_cmp(&similarities[a]));
    selected.truncate(top_k);

    Ok(selected
        .into_iter()
        .map(|i| {
            let entry = &reference_entries[i];
            Match {
                reference_id: entry.id.clone(),
                text: entry.text.clone(),
                similarity: similarities[i],
                file_name: entry.file_name.clone(),
            }
        })
        .collect())
}

fn validate<E>(
    query: &[f32],
    references: &[E],
    entries: &[ReferenceEntry],
    threshold: f32,
    top_k: usize,
) -> Result<(), MatchError>
where
    E: AsRef<[f32]>,
{
    if top_k == 0 {
        return Err(MatchError::InvalidTopK);
    }
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(MatchError::InvalidThreshold(threshold));
    }
    if references.is_empty() {
        return Err(MatchError::EmptyReferenceSet);
    }
    if references.len() != entries.len() {
        return Err(MatchError::MisalignedReferences {
            embeddings: references.len(),
            entries: entries.len(),
        });
    }
    if query.iter().any(|v| !v.is_finite()) {
        return Err(MatchError::InvalidEmbedding { index: None });
    }

    for (index, reference) in references.iter().enumerate() {
        let reference = reference.as_ref();
        if reference.len() != query.len() {
            return Err(MatchError::DimensionMismatch {
                expected: query.len(),
                got: reference.len(),
                index,
            });
        }
        if reference.iter().any(|v| !v.is_finite()) {
            return Err(MatchError::InvalidEmbedding { index: Some(index) });
        }
    }

    Ok(())
}

fn score<E>(query: &[f32], references: &[E]) -> Vec<f32>
where
    E: AsRef<[f32]> + Sync,
{
    if references.len() >= PARALLEL_SCORING_MIN {
        references
            .par_iter()
            .map(|reference| dot(query, reference.as_ref()))
            .collect()
    } else {
        references
            .iter()
            .map(|reference| dot(query, reference.as_ref()))
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// An immutable reference set: entries and their embeddings share one index
/// space.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCollection {
    entries: Vec<ReferenceEntry>,
    embeddings: Vec<Embedding>,
}

impl ReferenceCollection {
    /// Build a collection from entry/embedding pairs.
    ///
    /// Fails with [`MatchError::DimensionMismatch`] if the embeddings do not
    /// all share the first one's dimensionality.
    pub fn new(items: Vec<(ReferenceEntry, Embedding)>) -> Result<Self, MatchError> {
        let dimensions = items.first().map(|(_, e)| e.dimensions());
        let mut entries = Vec::with_capacity(items.len());
        let mut embeddings = Vec::with_capacity(items.len());

        for (index, (entry, embedding)) in items.into_iter().enumerate() {
            if let Some(expected) = dimensions {
                if embedding.dimensions() != expected {
                    return Err(MatchError::DimensionMismatch {
                        expected,
                        got: embedding.dimensions(),
                        index,
                    });
                }
            }
            entries.push(entry);
            embeddings.push(embedding);
        }

        Ok(Self {
            entries,
            embeddings,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality of the stored embeddings, `None` when empty.
    pub fn dimensions(&self) -> Option<usize> {
        self.embeddings.first().map(Embedding::dimensions)
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn find_matches(
        &self,
        query: &Embedding,
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<Match>, MatchError> {
        find_matches(
            query.as_slice(),
            &self.embeddings,
            &self.entries,
            threshold,
            top_k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<ReferenceEntry> {
        (0..n)
            .map(|i| ReferenceEntry {
                id: format!("ref-{i}"),
                text: format!("reference {i}"),
                file_name: None,
            })
            .collect()
    }

    /// Unit vectors in 2D whose dot product with [1, 0] is `similarity`.
    fn with_similarities(similarities: &[f32]) -> Vec<Vec<f32>> {
        similarities
            .iter()
            .map(|&s| vec![s, (1.0 - s * s).max(0.0).sqrt()])
            .collect()
    }

    fn ids(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.reference_id.as_str()).collect()
    }

    const QUERY: [f32; 2] = [1.0, 0.0];

    #[test]
    fn test_threshold_path_excludes_low_scores() {
        let refs = with_similarities(&[0.9, 0.4, 0.7]);
        let matches = find_matches(&QUERY, &refs, &entries(3), 0.6, 2).unwrap();

        assert_eq!(ids(&matches), vec!["ref-0", "ref-2"]);
        assert!((matches[0].similarity - 0.9).abs() < 1e-6);
        assert!((matches[1].similarity - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_when_nothing_clears_threshold() {
        let refs = with_similarities(&[0.9, 0.4, 0.7]);
        let matches = find_matches(&QUERY, &refs, &entries(3), 0.95, 2).unwrap();

        assert_eq!(ids(&matches), vec!["ref-0", "ref-2"]);
    }

    #[test]
    fn test_result_bounded_by_collection_size() {
        let refs = with_similarities(&[0.3]);
        let matches = find_matches(&QUERY, &refs, &entries(1), 0.0, 5).unwrap();

        assert_eq!(ids(&matches), vec!["ref-0"]);
    }

    #[test]
    fn test_ties_break_by_index() {
        let refs = vec![vec![0.5, 0.0], vec![0.5, 0.0]];
        let matches = find_matches(&QUERY, &refs, &entries(2), 0.0, 2).unwrap();

        assert_eq!(ids(&matches), vec!["ref-0", "ref-1"]);
    }

    #[test]
    fn test_ties_break_by_index_in_fallback() {
        let refs = vec![vec![0.1, 0.0], vec![0.2, 0.0], vec![0.2, 0.0], vec![0.1, 0.0]];
        let matches = find_matches(&QUERY, &refs, &entries(4), 0.9, 3).unwrap();

        assert_eq!(ids(&matches), vec!["ref-1", "ref-2", "ref-0"]);
    }

    #[test]
    fn test_threshold_path_does_not_pad_with_low_scores() {
        let refs = with_similarities(&[0.2, 0.8, 0.1]);
        let matches = find_matches(&QUERY, &refs, &entries(3), 0.5, 3).unwrap();

        assert_eq!(ids(&matches), vec!["ref-1"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let query = vec![0.0_f32; 384];
        let refs = vec![vec![0.0_f32; 768]];
        let result = find_matches(&query, &refs, &entries(1), 0.5, 3);

        assert_eq!(
            result,
            Err(MatchError::DimensionMismatch {
                expected: 384,
                got: 768,
                index: 0
            })
        );
    }

    #[test]
    fn test_empty_reference_set() {
        let refs: Vec<Vec<f32>> = vec![];
        let result = find_matches(&QUERY, &refs, &[], 0.5, 3);
        assert_eq!(result, Err(MatchError::EmptyReferenceSet));
    }

    #[test]
    fn test_non_finite_query_rejected() {
        let refs = with_similarities(&[0.5]);
        let result = find_matches(&[f32::NAN, 0.0], &refs, &entries(1), 0.5, 3);
        assert_eq!(result, Err(MatchError::InvalidEmbedding { index: None }));
    }

    #[test]
    fn test_non_finite_reference_rejected() {
        let refs = vec![vec![1.0, 0.0], vec![f32::INFINITY, 0.0]];
        let result = find_matches(&QUERY, &refs, &entries(2), 0.5, 3);
        assert_eq!(result, Err(MatchError::InvalidEmbedding { index: Some(1) }));
    }

    #[test]
    fn test_misaligned_collections() {
        let refs = with_similarities(&[0.5, 0.6]);
        let result = find_matches(&QUERY, &refs, &entries(1), 0.5, 3);
        assert_eq!(
            result,
            Err(MatchError::MisalignedReferences {
                embeddings: 2,
                entries: 1
            })
        );
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let refs = with_similarities(&[0.5]);
        let result = find_matches(&QUERY, &refs, &entries(1), 0.5, 0);
        assert_eq!(result, Err(MatchError::InvalidTopK));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let refs = with_similarities(&[0.5]);
        assert!(matches!(
            find_matches(&QUERY, &refs, &entries(1), 1.5, 1),
            Err(MatchError::InvalidThreshold(_))
        ));
        assert!(matches!(
            find_matches(&QUERY, &refs, &entries(1), f32::NAN, 1),
            Err(MatchError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_does_not_renormalize() {
        // Neither vector has unit norm; a re-normalizing matcher would
        // report 1.0 here.
        let refs = vec![vec![2.0_f32, 0.0]];
        let matches = find_matches(&[3.0, 0.0], &refs, &entries(1), -1.0, 1).unwrap();
        assert!((matches[0].similarity - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_file_name_carried_through() {
        let refs = with_similarities(&[0.9]);
        let mut entries = entries(1);
        entries[0].file_name = Some("glulam-report.pdf".to_string());

        let matches = find_matches(&QUERY, &refs, &entries, 0.5, 1).unwrap();
        assert_eq!(matches[0].file_name.as_deref(), Some("glulam-report.pdf"));
    }

    #[test]
    fn test_parallel_scoring_matches_sequential_order() {
        let n = PARALLEL_SCORING_MIN + 10;
        let refs: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                let s = (i % 100) as f32 / 100.0;
                vec![s, (1.0 - s * s).sqrt()]
            })
            .collect();

        let matches = find_matches(&QUERY, &refs, &entries(n), 0.985, 3).unwrap();

        // similarity 0.99 first appears at index 99
        assert_eq!(ids(&matches), vec!["ref-99", "ref-199", "ref-299"]);
    }

    #[test]
    fn test_collection_rejects_mixed_dimensions() {
        let items = vec![
            (
                entries(1).remove(0),
                Embedding::normalized(vec![1.0, 0.0]).unwrap(),
            ),
            (
                entries(2).remove(1),
                Embedding::normalized(vec![1.0, 0.0, 0.0]).unwrap(),
            ),
        ];
        assert!(matches!(
            ReferenceCollection::new(items),
            Err(MatchError::DimensionMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_collection_find_matches() {
        let items = vec![
            (
                entries(2).remove(0),
                Embedding::normalized(vec![0.0, 1.0]).unwrap(),
            ),
            (
                entries(2).remove(1),
                Embedding::normalized(vec![1.0, 1.0]).unwrap(),
            ),
        ];
        let collection = ReferenceCollection::new(items).unwrap();
        assert_eq!(collection.dimensions(), Some(2));

        let query = Embedding::normalized(vec![1.0, 0.0]).unwrap();
        let matches = collection.find_matches(&query, 0.5, 3).unwrap();
        assert_eq!(ids(&matches), vec!["ref-1"]);
    }
}
