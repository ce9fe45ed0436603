//! Problem repository: listing, descriptions and starter templates.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::GradeError;

pub const DESCRIPTION_FILE: &str = "README.md";
pub const TEMPLATE_FILE: &str = "solution.py";
/// Holds the original template while a full-suite run has it swapped out
pub const BACKUP_FILE: &str = "solution_backup.py";

/// Resolve `<root>/<slug>`, refusing anything that is not a plain slug
pub fn problem_dir(root: &Path, slug: &str) -> Result<PathBuf, GradeError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(GradeError::ProblemNotFound(slug.to_string()));
    }
    Ok(root.join(slug))
}

/// Like [`problem_dir`], but the directory must exist
pub async fn existing_problem_dir(root: &Path, slug: &str) -> Result<PathBuf, GradeError> {
    let dir = problem_dir(root, slug)?;
    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => Ok(dir),
        _ => Err(GradeError::ProblemNotFound(slug.to_string())),
    }
}

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    async fn list_slugs(&self) -> Result<BTreeSet<String>, GradeError>;
    async fn description(&self, slug: &str) -> Result<String, GradeError>;
    /// Starter code with line endings normalized to `\n`
    async fn template(&self, slug: &str) -> Result<String, GradeError>;
}

/// Problems laid out as one directory per slug
#[derive(Debug, Clone)]
pub struct FsProblemRepository {
    root: PathBuf,
}

impl FsProblemRepository {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    async fn read_problem_file(&self, slug: &str, file: &str) -> Result<String, GradeError> {
        let path = problem_dir(&self.root, slug)?.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GradeError::ProblemNotFound(slug.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ProblemRepository for FsProblemRepository {
    async fn list_slugs(&self) -> Result<BTreeSet<String>, GradeError> {
        let mut slugs = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if problem_dir(&self.root, &name).is_ok() => {
                    slugs.insert(name);
                }
                Ok(_) => {}
                Err(name) => warn!(name = ?name, "Skipping non UTF-8 problem directory"),
            }
        }
        Ok(slugs)
    }

    async fn description(&self, slug: &str) -> Result<String, GradeError> {
        self.read_problem_file(slug, DESCRIPTION_FILE).await
    }

    async fn template(&self, slug: &str) -> Result<String, GradeError> {
        let text = match self.read_problem_file(slug, BACKUP_FILE).await {
            Ok(text) => text,
            Err(GradeError::ProblemNotFound(_)) => self.read_problem_file(slug, TEMPLATE_FILE).await?,
            Err(e) => return Err(e),
        };
        Ok(normalize_line_endings(&text))
    }
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!("grader-problems-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn test_problem_dir_rejects_traversal() {
        let root = Path::new("/srv/problems");
        assert!(problem_dir(root, "two_sum").is_ok());
        assert!(problem_dir(root, "valid-parentheses").is_ok());
        assert!(problem_dir(root, "../etc").is_err());
        assert!(problem_dir(root, "a/b").is_err());
        assert!(problem_dir(root, "").is_err());
    }

    #[tokio::test]
    async fn test_list_slugs_sorted_directories_only() {
        let root = temp_root();
        fs::create_dir(root.join("two_sum")).unwrap();
        fs::create_dir(root.join("add_two_numbers")).unwrap();
        fs::write(root.join("notes.txt"), "not a problem").unwrap();

        let repo = FsProblemRepository::new(&root);
        let slugs = repo.list_slugs().await.unwrap();
        fs::remove_dir_all(&root).unwrap();

        let slugs: Vec<_> = slugs.into_iter().collect();
        assert_eq!(slugs, ["add_two_numbers", "two_sum"]);
    }

    #[tokio::test]
    async fn test_template_normalizes_line_endings() {
        let root = temp_root();
        fs::create_dir(root.join("two_sum")).unwrap();
        fs::write(root.join("two_sum").join(TEMPLATE_FILE), "class Solution:\r\n    pass\r\n").unwrap();
        fs::write(root.join("two_sum").join(DESCRIPTION_FILE), "# Two Sum\n").unwrap();

        let repo = FsProblemRepository::new(&root);
        let template = repo.template("two_sum").await;
        let description = repo.description("two_sum").await;
        let missing = repo.description("three_sum").await;
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(template.unwrap(), "class Solution:\n    pass\n");
        assert_eq!(description.unwrap(), "# Two Sum\n");
        assert!(matches!(missing, Err(GradeError::ProblemNotFound(_))));
    }

    #[tokio::test]
    async fn test_template_prefers_backup_during_swap() {
        let root = temp_root();
        fs::create_dir(root.join("two_sum")).unwrap();
        fs::write(root.join("two_sum").join(TEMPLATE_FILE), "submitted code").unwrap();
        fs::write(root.join("two_sum").join(BACKUP_FILE), "class Solution:\n    pass\n").unwrap();

        let template = FsProblemRepository::new(&root).template("two_sum").await;
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(template.unwrap(), "class Solution:\n    pass\n");
    }
}
