//! Question detection.

/// Decides whether a query asks for a generated answer.
///
/// A query is a question when it ends with `?` (ASCII or full-width) or has
/// more words than `word_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct QuestionClassifier {
    word_threshold: usize,
}

impl QuestionClassifier {
    pub fn new(word_threshold: usize) -> Self {
        Self { word_threshold }
    }

    pub fn is_question(&self, query: &str) -> bool {
        let query = query.trim();
        if query.ends_with('?') || query.ends_with('？') {
            return true;
        }
        query.split_whitespace().count() > self.word_threshold
    }
}

impl Default for QuestionClassifier {
    /// Five whitespace tokens: Vietnamese words often span two syllables, so
    /// a short keyword lookup like "Công nghệ AI mới nhất" stays below it.
    fn default() -> Self {
        Self::new(5)
    }
}
