//! Overview-text similarity between movies.
//!
//! Each overview becomes an L2-normalised TF-IDF vector over unigrams and
//! bigrams (English stop words removed, tokens of two or more word
//! characters). Similarity is the dot product of two vectors, i.e. cosine.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{Movie, MovieId};

/// Cap on vocabulary size; the most frequent terms are kept
const MAX_FEATURES: usize = 5000;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "even",
    "ever", "every", "few", "for", "from", "further", "get", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "if", "in",
    "into", "is", "it", "its", "itself", "just", "may", "me", "more", "most", "must", "my",
    "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only", "or", "other",
    "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "two", "under", "until", "up",
    "upon", "us", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "whom", "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
    "yours", "yourself", "yourselves",
];

type TermVector = BTreeMap<String, f64>;

fn tokenize(text: &str, stop_words: &BTreeSet<&str>) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !stop_words.contains(t.as_str()))
        .collect()
}

fn terms(tokens: &[String]) -> Vec<String> {
    let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));
    tokens.iter().cloned().chain(bigrams).collect()
}

/// TF-IDF vectors for every movie that has an overview
#[derive(Debug, Default)]
pub struct ContentIndex {
    vectors: BTreeMap<MovieId, TermVector>,
}

impl ContentIndex {
    /// Fits the vocabulary and IDF weights on the given movies
    ///
    /// Movies without an overview are left out of the index.
    pub fn build<'a>(movies: impl IntoIterator<Item = &'a Movie>) -> Self {
        let stop_words: BTreeSet<&str> = STOP_WORDS.iter().copied().collect();

        let documents: BTreeMap<MovieId, Vec<String>> = movies
            .into_iter()
            .filter_map(|m| {
                let overview = m.overview.as_deref()?;
                let doc_terms = terms(&tokenize(overview, &stop_words));
                (!doc_terms.is_empty()).then_some((m.id, doc_terms))
            })
            .collect();

        if documents.is_empty() {
            return Self::default();
        }

        let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
        for doc_terms in documents.values() {
            let mut seen = BTreeSet::new();
            for term in doc_terms {
                *corpus_counts.entry(term.as_str()).or_default() += 1;
                if seen.insert(term.as_str()) {
                    *document_frequency.entry(term.as_str()).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let vocabulary: BTreeSet<&str> = ranked
            .into_iter()
            .take(MAX_FEATURES)
            .map(|(term, _)| term)
            .collect();

        // Smoothed IDF: ln((1 + n) / (1 + df)) + 1
        let n = documents.len() as f64;
        let idf = |term: &str| {
            let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
            ((1.0 + n) / (1.0 + df)).ln() + 1.0
        };

        let mut vectors = BTreeMap::new();
        for (movie_id, doc_terms) in &documents {
            let mut vector: TermVector = BTreeMap::new();
            for term in doc_terms {
                if vocabulary.contains(term.as_str()) {
                    *vector.entry(term.clone()).or_default() += 1.0;
                }
            }
            for (term, weight) in vector.iter_mut() {
                *weight *= idf(term.as_str());
            }

            let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                vector.values_mut().for_each(|w| *w /= norm);
                vectors.insert(*movie_id, vector);
            }
        }

        tracing::debug!(
            movies = vectors.len(),
            vocabulary = vocabulary.len(),
            "Content index built"
        );

        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.vectors.contains_key(&movie_id)
    }

    /// Cosine similarity of two overviews, 0.0 when either is unknown
    pub fn similarity(&self, a: MovieId, b: MovieId) -> f64 {
        match (self.vectors.get(&a), self.vectors.get(&b)) {
            (Some(va), Some(vb)) => dot(va, vb),
            _ => 0.0,
        }
    }

    /// Up to `n` movies most similar to `movie_id` with positive similarity,
    /// skipping ids for which `exclude` is true. Ties go to the lower id.
    pub fn most_similar(
        &self,
        movie_id: MovieId,
        n: usize,
        exclude: impl Fn(MovieId) -> bool,
    ) -> Vec<(MovieId, f64)> {
        let Some(target) = self.vectors.get(&movie_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(MovieId, f64)> = self
            .vectors
            .iter()
            .filter(|(id, _)| **id != movie_id && !exclude(**id))
            .map(|(id, vector)| (*id, dot(target, vector)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(n);
        scored
    }
}

fn dot(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|other| w * other))
        .sum()
}
