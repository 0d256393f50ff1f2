//! Sequence similarity (Ratcliff/Obershelp "gestalt" matching).
//!
//! `ratio` is `2*M / T` where `T` is the total number of chars in both inputs
//! and `M` the number of chars in the matching blocks found by recursively
//! taking the longest common substring and repeating on both sides of it.
//!
//! When the second input is [`AUTOJUNK_MIN_LEN`] chars or longer, chars that
//! make up more than 1% of it are "popular": they cannot seed a match and are
//! only counted when they extend one. Long texts made of a few repeated chars
//! therefore score lower than a plain longest-common-substring count would.

use std::collections::{HashMap, HashSet};

/// Inputs at least this long get the popular-char heuristic.
pub const AUTOJUNK_MIN_LEN: usize = 200;

/// Similarity ratio in `[0.0, 1.0]`. Two empty strings are identical.
/// Not symmetric: the popular-char heuristic looks at `b` only.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    2.0 * matched as f64 / total as f64
}

/// Chars of `b` that may not start a match.
fn popular_chars(b: &[char]) -> HashSet<char> {
    if b.len() < AUTOJUNK_MIN_LEN {
        return HashSet::new();
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in b {
        *counts.entry(*c).or_default() += 1;
    }
    let limit = b.len() / 100 + 1;
    counts
        .into_iter()
        .filter(|(_, n)| *n > limit)
        .map(|(c, _)| c)
        .collect()
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let popular = popular_chars(b);
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, &popular, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common run in `a[alo..ahi]` / `b[blo..bhi]` seeded by non-popular
/// chars, then widened over equal neighbours. Ties go to the earliest start
/// in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    popular: &HashSet<char>,
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo;
            cur[col + 1] = if a[i] == b[j] && !popular.contains(&b[j]) {
                prev[col] + 1
            } else {
                0
            };
            let k = cur[col + 1];
            if k > best_k {
                best_k = k;
                best_i = i + 1 - k;
                best_j = j + 1 - k;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    while best_i > alo && best_j > blo && a[best_i - 1] == b[best_j - 1] {
        best_i -= 1;
        best_j -= 1;
        best_k += 1;
    }
    while best_i + best_k < ahi && best_j + best_k < bhi && a[best_i + best_k] == b[best_j + best_k]
    {
        best_k += 1;
    }

    (best_i, best_j, best_k)
}
