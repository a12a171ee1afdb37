use std::str::FromStr;

use crate::models::{ChangelogDocument, ChangelogEntry};

const TRUNCATION_NOTE: &str = "Some commits were too large for the model context and were truncated.";
const EMPTY_NOTE: &str = "No changes.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Markdown,
    Plain,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "plain" | "text" | "txt" => Ok(OutputFormat::Plain),
            other => Err(format!("unknown format '{}' (expected markdown or plain)", other)),
        }
    }
}

impl OutputFormat {
    pub fn renderer(&self) -> Box<dyn Renderer> {
        match self {
            OutputFormat::Markdown => Box::new(MarkdownRenderer),
            OutputFormat::Plain => Box::new(PlainTextRenderer),
        }
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, document: &ChangelogDocument) -> String;
}

pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, document: &ChangelogDocument) -> String {
        let mut output = match &document.release {
            Some(release) => format!("# Changelog {}\n", release),
            None => "# Changelog\n".to_string(),
        };

        if document.is_empty() {
            output.push_str(&format!("\n{}\n", EMPTY_NOTE));
        }

        for section in &document.sections {
            output.push_str(&format!("\n## {}\n\n", section.category.title()));
            for entry in &section.entries {
                output.push_str(&format!("- {}\n", entry_line(entry)));
            }
        }

        if !document.truncated_batches.is_empty() {
            output.push_str(&format!("\n_{}_\n", TRUNCATION_NOTE));
        }

        output
    }
}

pub struct PlainTextRenderer;

impl Renderer for PlainTextRenderer {
    fn render(&self, document: &ChangelogDocument) -> String {
        let title = match &document.release {
            Some(release) => format!("CHANGELOG {}", release),
            None => "CHANGELOG".to_string(),
        };
        let mut output = underlined(&title, '=');

        if document.is_empty() {
            output.push_str(&format!("\n{}\n", EMPTY_NOTE));
        }

        for section in &document.sections {
            output.push('\n');
            output.push_str(&underlined(&section.category.title().to_uppercase(), '-'));
            for entry in &section.entries {
                output.push_str(&format!("  * {}\n", entry_line(entry)));
            }
        }

        if !document.truncated_batches.is_empty() {
            output.push_str(&format!("\nNote: {}\n", TRUNCATION_NOTE));
        }

        output
    }
}

fn underlined(text: &str, ch: char) -> String {
    let rule: String = std::iter::repeat(ch).take(text.chars().count()).collect();
    format!("{}\n{}\n", text, rule)
}

fn entry_line(entry: &ChangelogEntry) -> String {
    if entry.commits.is_empty() {
        entry.description.clone()
    } else {
        format!("{} ({})", entry.description, entry.commits.join(", "))
    }
}
