use std::collections::HashSet;

use pulldown_cmark::{Options, Parser, html};

/// Converts readme markdown to sanitized HTML.
#[derive(Debug, Clone)]
pub struct ReadmeRenderer {
    extra_tags: HashSet<String>,
}

impl Default for ReadmeRenderer {
    fn default() -> Self {
        Self::new(["h1", "h2", "img"])
    }
}

impl ReadmeRenderer {
    /// `extra_tags` are allowed on top of ammonia's default allow-list.
    pub fn new<I, S>(extra_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extra_tags: extra_tags
                .into_iter()
                .map(|tag| tag.into().trim().to_ascii_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        }
    }

    pub fn render(&self, markdown: &str) -> String {
        self.sanitize(&to_html(markdown))
    }

    pub fn sanitize(&self, html: &str) -> String {
        let mut builder = ammonia::Builder::default();
        builder.add_tags(self.extra_tags.iter().map(String::as_str));
        builder.clean(html).to_string()
    }
}

pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
