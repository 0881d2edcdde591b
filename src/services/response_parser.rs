//! Turns the model's free-text reply into 0-based category indices.
//!
//! The primary format is one `fileNumber:categoryNumber` pair per line. When that
//! does not cover every file, every standalone integer in the reply is read in
//! order instead. The result is never an error: a vector shorter than the batch
//! is the signal that the caller has to fill the remaining positions itself.

use tracing::{debug, warn};

/// Parses `response` for a batch of `expected` files and `category_count` categories.
pub fn parse_classification_response(
    response: &str,
    expected: usize,
    category_count: usize,
) -> Vec<usize> {
    let mut slots: Vec<Option<usize>> = vec![None; expected];

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((file_no, category_no)) = parse_pair(line) else {
            continue;
        };
        if !(1..=expected).contains(&file_no) || !(1..=category_count).contains(&category_no) {
            continue;
        }
        let slot = &mut slots[file_no - 1];
        if slot.is_none() {
            *slot = Some(category_no - 1);
        }
    }

    if slots.iter().all(Option::is_some) {
        return slots.into_iter().flatten().collect();
    }

    let filled = slots.iter().filter(|s| s.is_some()).count();
    warn!(
        parsed = filled,
        expected, "classification reply did not cover every file, scanning for bare numbers"
    );
    debug!(response, "raw classification reply");

    let tokens = integer_tokens(response);
    if tokens.len() >= expected {
        return tokens
            .into_iter()
            .take(expected)
            .filter_map(|token| token.filter(|n| (1..=category_count).contains(n)))
            .map(|n| n - 1)
            .collect();
    }

    // Keep only the leading run so every returned index still lines up with its file.
    slots.into_iter().map_while(|slot| slot).collect()
}

/// Matches `<digits><one or more ':' or whitespace><digits>` spanning the whole line.
fn parse_pair(line: &str) -> Option<(usize, usize)> {
    let first_end = line.find(|c: char| !c.is_ascii_digit())?;
    if first_end == 0 {
        return None;
    }
    let (first, rest) = line.split_at(first_end);
    let second = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    if second.len() == rest.len()
        || second.is_empty()
        || !second.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some((first.parse().ok()?, second.parse().ok()?))
}

/// Every run of ASCII digits that is not glued to letters, digits or underscores.
/// Values too large for `usize` are kept as `None` so they still occupy a position.
fn integer_tokens(text: &str) -> Vec<Option<usize>> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()))
        .map(|word| word.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply() {
        assert_eq!(parse_classification_response("1:2\n2:1\n3:3", 3, 3), vec![1, 0, 2]);
    }

    #[test]
    fn separators_may_be_spaces_or_mixed() {
        assert_eq!(
            parse_classification_response("  1 : 2\n2 1\n\n3:\t3  ", 3, 3),
            vec![1, 0, 2]
        );
    }

    #[test]
    fn out_of_order_lines_are_placed_by_file_number() {
        assert_eq!(parse_classification_response("3:3\n1:2\n2:1", 3, 3), vec![1, 0, 2]);
    }

    #[test]
    fn first_answer_for_a_file_wins() {
        assert_eq!(
            parse_classification_response("1:1\n1:3\n2:2", 2, 3),
            vec![0, 1]
        );
    }

    #[test]
    fn garbage_with_enough_numbers_recovers_full_batch() {
        let reply = "Sure! Here you go -> 2, then 1, and finally 3.";
        assert_eq!(parse_classification_response(reply, 3, 3), vec![1, 0, 2]);
    }

    #[test]
    fn fallback_skips_out_of_range_tokens() {
        let reply = "answers: 2 9 1";
        assert_eq!(parse_classification_response(reply, 3, 3), vec![1, 0]);
    }

    #[test]
    fn too_few_numbers_gives_short_result() {
        let reply = "I cannot classify file 2";
        let parsed = parse_classification_response(reply, 3, 3);
        assert!(parsed.len() < 3);
    }

    #[test]
    fn partial_pairs_keep_aligned_prefix() {
        // two valid lines for five files, and too few tokens to retry
        let parsed = parse_classification_response("1:2\n2:3", 5, 3);
        assert_eq!(parsed, vec![1, 2]);
    }

    #[test]
    fn numbers_inside_words_are_not_tokens() {
        assert_eq!(integer_tokens("file1 2x _3 4"), vec![Some(4)]);
        assert_eq!(integer_tokens("文件 12:3"), vec![Some(12), Some(3)]);
    }

    #[test]
    fn oversized_numbers_are_ignored() {
        let reply = "1:99999999999999999999999999\n2:1";
        assert_eq!(parse_classification_response(reply, 2, 2).len(), 1);
    }

    #[test]
    fn pair_requires_separator_and_digits() {
        assert_eq!(parse_pair("12:4"), Some((12, 4)));
        assert_eq!(parse_pair("12::  4"), Some((12, 4)));
        assert_eq!(parse_pair("124"), None);
        assert_eq!(parse_pair("a:4"), None);
        assert_eq!(parse_pair("1:4b"), None);
        assert_eq!(parse_pair("1-4"), None);
    }

    #[test]
    fn empty_batch_parses_to_empty() {
        assert!(parse_classification_response("whatever", 0, 3).is_empty());
    }
}
