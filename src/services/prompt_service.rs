pub const SYSTEM_PROMPT: &str = "You are a file classification assistant. \
You infer what a file is about from its name alone and assign it to exactly one of the given categories.";

/// Splits `files` into contiguous batches of at most `batch_size` names, preserving order.
pub fn chunk_files(files: &[String], batch_size: usize) -> Vec<&[String]> {
    if files.is_empty() {
        return Vec::new();
    }
    files.chunks(batch_size.max(1)).collect()
}

pub fn batch_count(file_count: usize, batch_size: usize) -> usize {
    file_count.div_ceil(batch_size.max(1))
}

/// Renders the user message for one batch. Categories and files are both numbered from 1.
pub fn build_batch_prompt(batch: &[String], categories: &[String], descriptions: &str) -> String {
    let category_map = categories
        .iter()
        .enumerate()
        .map(|(i, label)| format!("{}: {label}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "Infer the topic of each file below from its file name (including the extension) \
and assign it to one of these categories.\n\
\n\
Categories (answer with the category number):\n\
{category_map}\n"
    );

    let descriptions = descriptions.trim();
    if !descriptions.is_empty() {
        prompt.push_str(&format!("\nCategory descriptions:\n{descriptions}\n"));
    }

    prompt.push_str(
        "\nRules:\n\
1. Read the whole file name, including the extension.\n\
2. If a name touches several topics, pick the most prominent one.\n\
3. Answer with one line per file in the form fileNumber:categoryNumber, for example:\n\
1:3\n\
2:1\n\
3:7\n\
Output nothing else.\n\
\n\
Files to classify:",
    );

    for (i, name) in batch.iter().enumerate() {
        prompt.push_str(&format!("\n[{}] {name}", i + 1));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("file_{i:03}.pdf")).collect()
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(chunk_files(&[], 30).is_empty());
        assert_eq!(batch_count(0, 30), 0);
    }

    #[test]
    fn batches_cover_input_in_order() {
        for count in [1, 29, 30, 31, 60, 65, 121] {
            let files = names(count);
            let batches = chunk_files(&files, 30);
            assert_eq!(batches.len(), batch_count(count, 30));
            assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), count);
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 30));
            let rejoined: Vec<String> = batches.concat();
            assert_eq!(rejoined, files);
        }
    }

    #[test]
    fn sixty_five_files_make_three_batches() {
        let files = names(65);
        let sizes: Vec<usize> = chunk_files(&files, 30).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![30, 30, 5]);
    }

    #[test]
    fn prompt_numbers_categories_and_files_from_one() {
        let categories = vec!["math".to_string(), "history".to_string()];
        let batch = vec!["calculus.pdf".to_string(), "rome.epub".to_string()];
        let prompt = build_batch_prompt(&batch, &categories, "");

        assert!(prompt.contains("1: math\n2: history"));
        assert!(prompt.contains("[1] calculus.pdf"));
        assert!(prompt.contains("[2] rome.epub"));
        assert!(prompt.contains("fileNumber:categoryNumber"));
        assert!(!prompt.contains("Category descriptions"));
    }

    #[test]
    fn prompt_includes_descriptions_when_given() {
        let categories = vec!["math".to_string()];
        let batch = vec!["a.pdf".to_string()];
        let prompt = build_batch_prompt(&batch, &categories, "math: anything with equations");
        assert!(prompt.contains("Category descriptions:\nmath: anything with equations"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let categories = vec!["a".to_string(), "b".to_string()];
        let batch = names(5);
        assert_eq!(
            build_batch_prompt(&batch, &categories, "x"),
            build_batch_prompt(&batch, &categories, "x")
        );
    }
}
