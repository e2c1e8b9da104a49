//! Groundedness estimate for generated answers.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Answers scoring below this are logged as possibly ungrounded.
pub const LOW_GROUNDING: f32 = 0.5;

/// Share of the answer's words that also occur in `context`.
///
/// Words are compared lowercased; single-character tokens are ignored.
/// Returns `None` when the answer has no words to check.
pub fn grounding_ratio(answer: &str, context: &str) -> Option<f32> {
    let known: HashSet<String> = words(context).collect();
    let (mut total, mut found) = (0usize, 0usize);

    for word in words(answer) {
        total += 1;
        if known.contains(&word) {
            found += 1;
        }
    }

    (total > 0).then(|| found as f32 / total as f32)
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words()
        .filter(|word| word.chars().count() > 1)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_grounded() {
        let context = "Trí tuệ nhân tạo giúp tòa soạn tóm tắt tin tức.";
        let ratio = grounding_ratio("Tòa soạn dùng trí tuệ nhân tạo", context).unwrap();
        assert!(ratio > 0.8, "ratio = {}", ratio);
    }

    #[test]
    fn test_ungrounded() {
        let ratio = grounding_ratio("Bóng đá hôm qua", "Trí tuệ nhân tạo").unwrap();
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn test_empty_answer() {
        assert_eq!(grounding_ratio("", "bất kỳ"), None);
        assert_eq!(grounding_ratio("a ?", "bất kỳ"), None);
    }
}
