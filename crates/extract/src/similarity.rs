//! Character-level similarity ratio based on longest matching blocks
//! (Ratcliff/Obershelp).

use std::collections::HashMap;

/// `2 * M / (|a| + |b|)` where `M` is the number of characters covered by
/// the recursively found longest common blocks. Two empty strings score 1.0.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut positions: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, c) in b.iter().enumerate() {
        positions.entry(*c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, &positions, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest block `a[i..i+size] == b[j..j+size]` inside the given windows.
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    positions: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // run length of the match ending at (i - 1, j), keyed by j
    let mut prev: HashMap<usize, usize> = HashMap::new();

    for i in alo..ahi {
        let mut current: HashMap<usize, usize> = HashMap::new();
        if let Some(js) = positions.get(&a[i]) {
            for &j in js.iter().filter(|&&j| j >= blo && j < bhi) {
                let k = if j > blo {
                    prev.get(&(j - 1)).copied().unwrap_or(0) + 1
                } else {
                    1
                };
                current.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        prev = current;
    }

    (best_i, best_j, best_size)
}
