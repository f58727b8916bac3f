//! Unit-cost edit distance (insert, delete, substitute) over `char`s.

use crate::config::DistanceAlgorithm;

/// Longest pattern the bit-parallel variant handles in one machine word.
pub const MYERS_MAX_LEN: usize = 64;

/// Size of the pattern-equality table; only code points below this value are
/// accepted by the bit-parallel variant.
pub const MYERS_ALPHABET: usize = 128;

impl DistanceAlgorithm {
    pub fn distance(&self, a: &str, b: &str) -> usize {
        match self {
            DistanceAlgorithm::Levenshtein => levenshtein(a, b),
            DistanceAlgorithm::BitParallelMyers => bit_parallel_myers(a, b),
        }
    }
}

/// Classic two-row dynamic programme. O(n·m) time, O(min(n, m)) space,
/// any length and any alphabet.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    levenshtein_chars(&a, &b)
}

fn levenshtein_chars(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = prev[j] + usize::from(lc != sc);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Myers' bit-vector edit distance (Hyyrö's global formulation).
///
/// Valid when both strings are at most 64 chars and every char is below
/// U+0080; anything else is delegated to [`levenshtein`].
pub fn bit_parallel_myers(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if !myers_eligible(&a) || !myers_eligible(&b) {
        return levenshtein_chars(&a, &b);
    }
    // the shorter string is the bit pattern
    let (pattern, text) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if pattern.is_empty() {
        return text.len();
    }

    let m = pattern.len();
    let mut peq = [0u64; MYERS_ALPHABET];
    for (i, c) in pattern.iter().enumerate() {
        peq[*c as usize] |= 1u64 << i;
    }

    let last = 1u64 << (m - 1);
    let mut pv = u64::MAX;
    let mut mv = 0u64;
    let mut score = m;

    for c in text.iter() {
        let eq = peq[*c as usize];
        let xv = eq | mv;
        let xh = ((eq & pv).wrapping_add(pv) ^ pv) | eq;
        let mut ph = mv | !(xh | pv);
        let mut mh = pv & xh;

        if ph & last != 0 {
            score += 1;
        } else if mh & last != 0 {
            score -= 1;
        }

        // row 0 of the DP table grows by one per text char
        ph = (ph << 1) | 1;
        mh <<= 1;
        pv = mh | !(xv | ph);
        mv = ph & xv;
    }
    score
}

fn myers_eligible(s: &[char]) -> bool {
    s.len() <= MYERS_MAX_LEN && s.iter().all(|c| (*c as u32) < MYERS_ALPHABET as u32)
}

/// `1 - d / max(len)` on char lengths; two empty strings are identical.
pub fn similarity(algorithm: DistanceAlgorithm, a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - algorithm.distance(a, b) as f64 / max_len as f64
}
