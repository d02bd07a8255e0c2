//! Sequence similarity for the PDF static/dynamic classifier.

/// Similarity of two strings in `[0, 1]`: the longest common subsequence of
/// their characters, normalised by the longer string's length. Symmetric by
/// construction; identical strings score 1.0, disjoint strings 0.0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() && b_chars.is_empty() {
        return 1.0;
    }
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }

    // Rolling single-row LCS table.
    let mut row = vec![0usize; b_chars.len() + 1];
    for &ca in &a_chars {
        let mut prev_diag = 0;
        for (j, &cb) in b_chars.iter().enumerate() {
            let tmp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag + 1
            } else {
                row[j + 1].max(row[j])
            };
            prev_diag = tmp;
        }
    }

    let lcs = row[b_chars.len()];
    lcs as f64 / a_chars.len().max(b_chars.len()) as f64
}
