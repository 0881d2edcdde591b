use serde::{Deserialize, Serialize};

/// One row of the results view: a scanned file and the category it is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFile {
    /// 1-based scan position.
    pub id: usize,
    pub filename: String,
    pub category_index: usize,
    pub category: String,
}

/// Pairs files with their classifications by position. Files past the end of
/// `classifications` are not listed; out-of-range indices display as the last category.
pub fn build_rows(
    files: &[String],
    classifications: &[usize],
    categories: &[String],
) -> Vec<ClassifiedFile> {
    files
        .iter()
        .zip(classifications)
        .enumerate()
        .map(|(i, (filename, &category_index))| {
            let category = categories
                .get(category_index)
                .or_else(|| categories.last())
                .cloned()
                .unwrap_or_default();
            ClassifiedFile {
                id: i + 1,
                filename: filename.clone(),
                category_index,
                category,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_numbered_from_one() {
        let files = vec!["a.pdf".to_string(), "b.txt".to_string(), "c.md".to_string()];
        let categories = vec!["math".to_string(), "misc".to_string()];
        let rows = build_rows(&files, &[1, 0], &categories);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].category, "misc");
        assert_eq!(rows[1].filename, "b.txt");
        assert_eq!(rows[1].category, "math");
    }

    #[test]
    fn out_of_range_index_displays_last_category() {
        let files = vec!["a.pdf".to_string()];
        let categories = vec!["math".to_string(), "misc".to_string()];
        let rows = build_rows(&files, &[9], &categories);
        assert_eq!(rows[0].category_index, 9);
        assert_eq!(rows[0].category, "misc");
    }
}
