//! Paragraph alignment for training document pairs.
//!
//! A longest-common-subsequence-style dynamic program over the two paragraph
//! sequences, scored by token-overlap text similarity. Alignment keeps
//! relative order, so a pure reordering aligns the unmoved paragraph
//! identically and leaves the moved one unmatched; unmatched paragraphs are
//! ignored, never treated as corrections.

use std::collections::HashMap;

/// One aligned (original, corrected) paragraph pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub original_index: usize,
    pub corrected_index: usize,
    pub similarity: f32,
}

/// Dice coefficient over lowercase alphanumeric token multisets.
///
/// 1.0 for identical token streams, 0.0 for disjoint ones. Two empty
/// paragraphs count as identical.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in &tokens_a {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    let mut overlap = 0usize;
    for t in &tokens_b {
        if let Some(c) = counts.get_mut(t.as_str()) {
            if *c > 0 {
                *c -= 1;
                overlap += 1;
            }
        }
    }

    (2 * overlap) as f32 / (tokens_a.len() + tokens_b.len()) as f32
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Align two paragraph sequences, maximizing total pair similarity. Pairs
/// scoring below `min_similarity` never align.
pub fn align_paragraphs(
    original: &[String],
    corrected: &[String],
    min_similarity: f32,
) -> Vec<AlignedPair> {
    let n = original.len();
    let m = corrected.len();
    if n == 0 || m == 0 {
        return Vec::new();
    }

    // Pairwise similarities, gated by the floor.
    let mut sims = vec![0.0f32; n * m];
    for i in 0..n {
        for j in 0..m {
            let s = text_similarity(&original[i], &corrected[j]);
            if s >= min_similarity {
                sims[i * m + j] = s;
            }
        }
    }

    // score[i][j]: best total similarity aligning original[..i] with
    // corrected[..j]. choice records the move taken so backtracking is
    // exact rather than re-derived from float comparisons.
    const SKIP_ORIGINAL: u8 = 0;
    const SKIP_CORRECTED: u8 = 1;
    const PAIR: u8 = 2;

    let mut score = vec![0.0f32; (n + 1) * (m + 1)];
    let mut choice = vec![SKIP_ORIGINAL; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in 1..=n {
        for j in 1..=m {
            let (mut best, mut best_choice) = if score[idx(i - 1, j)] >= score[idx(i, j - 1)] {
                (score[idx(i - 1, j)], SKIP_ORIGINAL)
            } else {
                (score[idx(i, j - 1)], SKIP_CORRECTED)
            };
            let s = sims[(i - 1) * m + (j - 1)];
            if s > 0.0 && score[idx(i - 1, j - 1)] + s >= best {
                best = score[idx(i - 1, j - 1)] + s;
                best_choice = PAIR;
            }
            score[idx(i, j)] = best;
            choice[idx(i, j)] = best_choice;
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 && j > 0 {
        match choice[idx(i, j)] {
            PAIR => {
                pairs.push(AlignedPair {
                    original_index: i - 1,
                    corrected_index: j - 1,
                    similarity: sims[(i - 1) * m + (j - 1)],
                });
                i -= 1;
                j -= 1;
            }
            SKIP_ORIGINAL => i -= 1,
            _ => j -= 1,
        }
    }
    pairs.reverse();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sequences_align_fully() {
        let original = strings(&["Alpha beta gamma.", "Delta epsilon."]);
        let pairs = align_paragraphs(&original, &original, 0.4);
        assert_eq!(pairs.len(), 2);
        for (k, p) in pairs.iter().enumerate() {
            assert_eq!(p.original_index, k);
            assert_eq!(p.corrected_index, k);
            assert!((p.similarity - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn edited_paragraph_still_aligns() {
        let original = strings(&["The term of this agreement is perpetual and binding."]);
        let corrected = strings(&["The term of this agreement is two years and binding."]);
        let pairs = align_paragraphs(&original, &corrected, 0.4);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].similarity > 0.6);
        assert!(pairs[0].similarity < 1.0);
    }

    #[test]
    fn insertion_shifts_alignment_without_false_pairs() {
        let original = strings(&["First paragraph of text.", "Second paragraph of words."]);
        let corrected = strings(&[
            "First paragraph of text.",
            "A brand new inserted clause about indemnification.",
            "Second paragraph of words.",
        ]);
        let pairs = align_paragraphs(&original, &corrected, 0.4);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].corrected_index, 0);
        assert_eq!(pairs[1].corrected_index, 2);
    }

    #[test]
    fn reordering_unchanged_paragraphs_yields_no_edits() {
        // Two unrelated paragraphs swapped, text untouched. LCS keeps order,
        // so one aligns identically and the other is unmatched.
        let original = strings(&[
            "Confidential information must be protected at all times.",
            "Delaware law governs this agreement entirely.",
        ]);
        let corrected = strings(&[
            "Delaware law governs this agreement entirely.",
            "Confidential information must be protected at all times.",
        ]);
        let pairs = align_paragraphs(&original, &corrected, 0.4);
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dissimilar_paragraphs_never_align() {
        let original = strings(&["Entirely about confidentiality obligations."]);
        let corrected = strings(&["Wholly unrelated venue selection text."]);
        let pairs = align_paragraphs(&original, &corrected, 0.4);
        assert!(pairs.is_empty());
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let a = "One two three four";
        let b = "three four five six";
        let s1 = text_similarity(a, b);
        let s2 = text_similarity(b, a);
        assert!((s1 - s2).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&s1));
        assert!((s1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(text_similarity("", ""), 1.0);
        assert_eq!(text_similarity("words", ""), 0.0);
        assert!(align_paragraphs(&[], &strings(&["x"]), 0.4).is_empty());
    }
}
