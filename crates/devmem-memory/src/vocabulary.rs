use std::collections::{BTreeMap, HashMap, HashSet};

use crate::tokenizer::tokenize;

/// Token → vector index table with smoothed IDF weights.
///
/// Built once from a full corpus and never updated in place. Tokens are
/// assigned indices in lexicographic order, so the same corpus always yields
/// the same vector layout.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    index: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl Vocabulary {
    /// Build a vocabulary from a corpus of raw documents.
    ///
    /// `idf = ln(N / df) + 1`, where `df` counts each document at most once
    /// per token.
    pub fn build<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let distinct: HashSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for token in distinct {
                *df.entry(token).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        let mut index = HashMap::with_capacity(df.len());
        let mut idf = Vec::with_capacity(df.len());
        for (i, (token, count)) in df.into_iter().enumerate() {
            idf.push((n / count as f64).ln() + 1.0);
            index.insert(token, i);
        }

        Self { index, idf }
    }

    /// Vector dimensionality (number of distinct tokens).
    pub fn size(&self) -> usize {
        self.idf.len()
    }

    /// Returns `true` for a vocabulary built from an empty corpus.
    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    /// IDF weight of `token`, or 0 if the token is unknown.
    pub fn idf(&self, token: &str) -> f64 {
        self.index
            .get(&token.to_lowercase())
            .map_or(0.0, |&i| self.idf[i])
    }

    /// Embed `text` as an L2-normalized TF-IDF vector of length [`size`](Self::size).
    ///
    /// Unknown tokens contribute nothing. Text with no known token yields the
    /// zero vector.
    pub fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.size()];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vector;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let total = tokens.len() as f64;
        for (token, count) in counts {
            if let Some(&i) = self.index.get(token) {
                vector[i] = (count as f64 / total) * self.idf[i];
            }
        }

        normalize(&mut vector);
        vector
    }
}

/// Scale `vector` to unit length in place. A zero vector is left untouched.
fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
}
