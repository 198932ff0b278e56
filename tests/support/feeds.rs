//! Atom feed fixtures in the shape the arXiv API returns.

#![allow(dead_code)]

use std::fmt::Write;

/// One `<entry>` worth of fixture data.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub author: String,
    pub updated: String,
    pub published: String,
    pub category: String,
    pub pdf_url: Option<String>,
}

impl Entry {
    /// Entry `2401.NNNNNv1` updated `minute` minutes after 2024-01-01T00:00Z.
    pub fn numbered(n: u32, minute: u32) -> Self {
        let ts = format!("2024-01-01T{:02}:{:02}:00Z", minute / 60, minute % 60);
        Self {
            id: format!("2401.{n:05}v1"),
            title: format!("Paper number {n}"),
            author: "Ada Lovelace".to_string(),
            updated: ts.clone(),
            published: ts,
            category: "cs.AI".to_string(),
            pdf_url: None,
        }
    }

    pub fn with_pdf(mut self, pdf_url: impl Into<String>) -> Self {
        self.pdf_url = Some(pdf_url.into());
        self
    }
}

/// Renders a feed reporting `total` results.
pub fn atom_feed(total: u64, entries: &[Entry]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
"#,
    );
    let _ = writeln!(
        xml,
        "  <opensearch:totalResults>{total}</opensearch:totalResults>"
    );
    for entry in entries {
        let _ = write!(
            xml,
            r#"  <entry>
    <id>http://arxiv.org/abs/{id}</id>
    <updated>{updated}</updated>
    <published>{published}</published>
    <title>{title}</title>
    <summary>Abstract of {id}.</summary>
    <author><name>{author}</name></author>
    <link href="http://arxiv.org/abs/{id}" rel="alternate" type="text/html"/>
"#,
            id = entry.id,
            updated = entry.updated,
            published = entry.published,
            title = entry.title,
            author = entry.author,
        );
        if let Some(pdf) = &entry.pdf_url {
            let _ = writeln!(
                xml,
                r#"    <link title="pdf" href="{pdf}" rel="related" type="application/pdf"/>"#
            );
        }
        let _ = write!(
            xml,
            r#"    <arxiv:primary_category term="{cat}"/>
    <category term="{cat}"/>
  </entry>
"#,
            cat = entry.category
        );
    }
    xml.push_str("</feed>\n");
    xml
}
