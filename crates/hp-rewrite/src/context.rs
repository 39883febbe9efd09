//! Repository coordinates a document is rewritten against.

use hp_core::PreviewError;
use hp_core::PreviewResult;
use hp_url::resolve;

/// Hosting site used when none is configured.
pub const DEFAULT_HOST: &str = "github.com";

/// Immutable description of where a previewed document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub host: String,
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
    /// Path of the document inside the repository, without a leading `/`.
    pub file: String,
    /// URL of the top-level viewer page; fragment-only links resolve here.
    pub page_url: String,
    /// Where the viewer was opened from, when the caller knows it.
    pub original_url: Option<String>,
}

impl RewriteContext {
    pub fn new(
        repo: impl Into<String>,
        branch: impl Into<String>,
        file: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Self {
        let file = file.into();
        Self {
            host: DEFAULT_HOST.to_owned(),
            repo: repo.into(),
            branch: branch.into(),
            file: file.trim_start_matches('/').to_owned(),
            page_url: page_url.into(),
            original_url: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_original_url(mut self, original_url: impl Into<String>) -> Self {
        self.original_url = Some(original_url.into());
        self
    }

    pub fn validate(&self) -> PreviewResult<()> {
        if self.host.is_empty() || self.host.contains(['/', '?', '#', '@']) {
            return Err(PreviewError::new(
                "rewrite.context.invalid_host",
                format!("`{}` is not a bare host name", self.host),
            ));
        }

        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(PreviewError::new(
                    "rewrite.context.invalid_repo",
                    format!("repository `{}` must look like `owner/name`", self.repo),
                ));
            }
        }

        if self.branch.is_empty() {
            return Err(PreviewError::new(
                "rewrite.context.missing_branch",
                "branch must not be empty",
            ));
        }

        if self.file.is_empty() || self.file.ends_with('/') {
            return Err(PreviewError::new(
                "rewrite.context.invalid_file",
                format!("`{}` does not name a file", self.file),
            ));
        }

        Ok(())
    }

    /// Directory part of `file`, including its trailing `/`; empty at the
    /// repository root.
    pub fn file_directory(&self) -> &str {
        match self.file.rfind('/') {
            Some(index) => &self.file[..=index],
            None => "",
        }
    }

    /// Root for the document's own resources: raw file content.
    pub fn content_base(&self) -> PreviewResult<String> {
        self.base_for("raw")
    }

    /// Root for human navigation: the hosting site's file view.
    pub fn browse_base(&self) -> PreviewResult<String> {
        self.base_for("blob")
    }

    /// The document's own page on the hosting site.
    pub fn browse_url(&self) -> PreviewResult<String> {
        self.file_url(&self.browse_base()?)
    }

    /// Where the document's source can be downloaded.
    pub fn raw_url(&self) -> PreviewResult<String> {
        self.file_url(&self.content_base()?)
    }

    fn file_url(&self, directory: &str) -> PreviewResult<String> {
        let name = self.file.rsplit('/').next().unwrap_or_default();
        resolve(&format!("./{}", escape_delimiters(name)), directory)
    }

    fn base_for(&self, view: &str) -> PreviewResult<String> {
        let root = format!("https://{}/{}/{view}/{}/", self.host, self.repo, self.branch);
        // The `./` prefix keeps a first segment such as `v1:2` from reading
        // as a scheme.
        let directory = format!("./{}", escape_delimiters(self.file_directory()));
        resolve(&directory, &root)
    }
}

/// Percent-encodes the characters that would end a URL path.
fn escape_delimiters(path: &str) -> String {
    path.replace('?', "%3F").replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::RewriteContext;

    fn context(file: &str) -> RewriteContext {
        RewriteContext::new("octo/site", "main", file, "https://preview.example/view?t=1#top")
    }

    #[test]
    fn content_base_points_at_raw_directory() {
        assert_eq!(
            context("docs/guide/index.html").content_base(),
            Ok("https://github.com/octo/site/raw/main/docs/guide/".to_owned())
        );
    }

    #[test]
    fn browse_base_points_at_blob_directory() {
        assert_eq!(
            context("docs/index.html").browse_base(),
            Ok("https://github.com/octo/site/blob/main/docs/".to_owned())
        );
    }

    #[test]
    fn root_level_file_uses_branch_root() {
        let ctx = context("/index.html").with_host("git.example.org");
        assert_eq!(ctx.file, "index.html");
        assert_eq!(ctx.file_directory(), "");
        assert_eq!(
            ctx.content_base(),
            Ok("https://git.example.org/octo/site/raw/main/".to_owned())
        );
    }

    #[test]
    fn directory_with_colon_is_not_a_scheme() {
        let ctx = context("v1:2/index.html");
        assert_eq!(
            ctx.content_base(),
            Ok("https://github.com/octo/site/raw/main/v1:2/".to_owned())
        );
        assert_eq!(
            ctx.browse_url(),
            Ok("https://github.com/octo/site/blob/main/v1:2/index.html".to_owned())
        );
    }

    #[test]
    fn path_delimiters_in_file_are_encoded() {
        let ctx = context("notes#1/a?b.html");
        assert_eq!(
            ctx.browse_url(),
            Ok("https://github.com/octo/site/blob/main/notes%231/a%3Fb.html".to_owned())
        );
    }

    #[test]
    fn validation_rejects_malformed_coordinates() {
        assert!(context("index.html").validate().is_ok());

        let bad_repo = RewriteContext::new("octo", "main", "a.html", "https://x/");
        assert!(matches!(
            bad_repo.validate(),
            Err(error) if error.code == "rewrite.context.invalid_repo"
        ));

        let bad_file = context("docs/");
        assert!(matches!(
            bad_file.validate(),
            Err(error) if error.code == "rewrite.context.invalid_file"
        ));

        let bad_host = context("a.html").with_host("evil.com/path");
        assert!(matches!(
            bad_host.validate(),
            Err(error) if error.code == "rewrite.context.invalid_host"
        ));
    }
}
