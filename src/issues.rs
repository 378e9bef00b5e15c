use anyhow::Result;
use regex::Regex;

/// Turns `#1234` references in a message into links built from a template.
#[derive(Debug, Clone)]
pub struct IssueAnnotator {
    template: String,
    pattern: Regex,
}

impl IssueAnnotator {
    /// Returns `None` when the template is empty, i.e. annotation is disabled.
    pub fn new(template: &str) -> Result<Option<Self>> {
        if template.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            template: template.to_string(),
            pattern: Regex::new(r"(?:^|\s)#([0-9]+)\b")?,
        }))
    }

    /// Issue numbers referenced in `text`, in order of appearance.
    pub fn issue_ids<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// The combined reply for `text`, or `None` if it references no issues.
    pub fn annotate(&self, text: &str) -> Option<String> {
        let links: String = self
            .issue_ids(text)
            .into_iter()
            .map(|id| self.template.replace("%s", id))
            .collect();
        if links.is_empty() {
            return None;
        }
        Some(format!("Post links:\n{}", links))
    }
}
