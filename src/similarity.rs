// 🎯 Name Similarity - Bounded [0, 1] score between two normalized names
// Max of two complementary measures:
//   - ratio: indel ratio 2·LCS / (len_a + len_b), good for short single-token names
//   - token_sort_ratio: same ratio after sorting whitespace tokens, tolerant of reordering
//
// Scores are whole percentages (0.96, 0.75, ...) so thresholds compare exactly.

/// Indel (insert/delete only) ratio as a whole percentage; 1.0 = identical
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let raw = (2 * longest_common_subsequence(&a, &b)) as f64 / total as f64;
    to_percent(raw)
}

/// Ratio after sorting whitespace-separated tokens
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_tokens(a), &sort_tokens(b))
}

/// Similarity between two normalized keys. Symmetric; equal inputs score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    ratio(a, b).max(token_sort_ratio(a, b)).clamp(0.0, 1.0)
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Length of the longest common subsequence, single-row DP
fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];

    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }

    row[b.len()]
}

/// Round half to even at two decimals
fn to_percent(raw: f64) -> f64 {
    (raw * 100.0).round_ties_even() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================
