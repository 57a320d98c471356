//! PDF report rendering.
//!
//! Turns a [`BreachReport`] into the deliverable document: a summary page,
//! one entry per breach source, and a closing page of security
//! recommendations. Rendering is a pure function of its inputs apart from the
//! generated-at stamp.

use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::breach::BreachReport;
use crate::fulfillment::FulfillmentError;

/// The rendered document, consumed exactly once by the notifier.
pub struct ReportArtifact {
    pub content: Vec<u8>,
    pub breach_count: u32,
}

/// Seam for the rendering collaborator, mockable in tests.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, email: &str, report: &BreachReport) -> Result<ReportArtifact, FulfillmentError>;
}

// A4 portrait, in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
/// A new page starts once the cursor drops below this; enough room for one
/// more source entry plus the footer.
const PAGE_BREAK_FLOOR: f32 = 90.0;

/// lopdf-backed renderer.
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRenderer for PdfRenderer {
    fn render(&self, email: &str, report: &BreachReport) -> Result<ReportArtifact, FulfillmentError> {
        let mut page = PageComposer::new();

        page.line(22.0, "Email Risk Analysis Report");
        page.line(9.0, &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC")));
        page.gap(20.0);

        page.line(13.0, "Analyzed email address:");
        page.line(11.0, email);
        page.gap(16.0);

        page.line(13.0, "Breach summary:");
        if report.match_count > 0 {
            let plural = if report.match_count > 1 { "es" } else { "" };
            page.line(
                11.0,
                &format!("ALERT: this email was found in {} data breach{plural}.", report.match_count),
            );
            page.line(
                10.0,
                "Your email and associated data may have been exposed in the breaches below.",
            );
        } else {
            page.line(11.0, "No breaches found in our database.");
            page.line(
                10.0,
                "Your email was not found in any known data breach at this time.",
            );
        }
        page.gap(20.0);

        if !report.sources.is_empty() {
            page.line(13.0, "Detailed breach information:");
            page.gap(8.0);

            for (index, source) in report.sources.iter().enumerate() {
                // Keep each entry on one page
                page.ensure_room(48.0);
                page.line(
                    11.0,
                    &format!("{}. {}", index + 1, source.name.as_deref().unwrap_or("Unknown source")),
                );
                page.line(9.0, &format!("Date: {}", source.date.as_deref().unwrap_or("Unknown")));
                if !source.exposed_fields.is_empty() {
                    page.line(9.0, &format!("Exposed data: {}", source.exposed_fields.join(", ")));
                }
                page.gap(8.0);
            }
        }

        page.new_page();
        page.line(16.0, "Security Recommendations");
        page.gap(14.0);
        for (title, text) in RECOMMENDATIONS {
            page.ensure_room(44.0);
            page.line(11.0, title);
            page.line(9.0, text);
            page.gap(10.0);
        }
        page.gap(18.0);
        page.line(7.0, "This report is confidential and intended solely for the recipient.");

        let content = page.finish()?;
        Ok(ReportArtifact {
            content,
            breach_count: report.match_count,
        })
    }
}

const RECOMMENDATIONS: &[(&str, &str)] = &[
    (
        "1. Change your passwords immediately",
        "Update passwords on all accounts associated with this email, using a strong unique password per service.",
    ),
    (
        "2. Enable two-factor authentication",
        "Add a second factor on all important accounts, starting with email, banking and social media.",
    ),
    (
        "3. Monitor your accounts",
        "Check financial statements and account activity regularly for suspicious transactions.",
    ),
    (
        "4. Use a password manager",
        "A reputable password manager can generate and store strong unique passwords for every account.",
    ),
    (
        "5. Be cautious of phishing",
        "Treat unexpected emails and links with extra suspicion, especially if your data has been exposed.",
    ),
];

/// Accumulates text lines into pages, breaking to a new page when the
/// remaining vertical space drops below the floor.
struct PageComposer {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl PageComposer {
    fn new() -> Self {
        let mut composer = Self { pages: Vec::new(), y: 0.0 };
        composer.new_page();
        composer
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Break to a new page unless `needed` points still fit above the floor.
    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < PAGE_BREAK_FLOOR {
            self.new_page();
        }
    }

    fn gap(&mut self, amount: f32) {
        self.y -= amount;
    }

    fn line(&mut self, size: f32, text: &str) {
        self.ensure_room(size + 4.0);
        self.y -= size + 4.0;

        if let Some(ops) = self.pages.last_mut() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(size as i64)]));
            ops.push(Operation::new(
                "Td",
                vec![Object::Integer(MARGIN as i64), Object::Integer(self.y as i64)],
            ));
            ops.push(Operation::new("Tj", vec![Object::string_literal(text)]));
            ops.push(Operation::new("ET", vec![]));
        }
    }

    /// Assemble the pages into a finished PDF byte stream.
    fn finish(self) -> Result<Vec<u8>, FulfillmentError> {
        let render_err = |e: lopdf::Error| FulfillmentError::RenderFailure(e.to_string());

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for operations in self.pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().map_err(render_err)?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), (PAGE_HEIGHT as i64).into()],
            });
            kids.push(page_id.into());
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| FulfillmentError::RenderFailure(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breach::BreachSource;

    fn source(name: &str) -> BreachSource {
        BreachSource {
            name: Some(name.to_string()),
            date: Some("2021-06".to_string()),
            exposed_fields: vec!["email".to_string(), "password".to_string()],
        }
    }

    fn page_count(artifact: &ReportArtifact) -> usize {
        let doc = Document::load_mem(&artifact.content).expect("rendered PDF should parse");
        doc.get_pages().len()
    }

    #[test]
    fn test_render_zero_sources() {
        let artifact = PdfRenderer::new()
            .render("customer@example.com", &BreachReport::default())
            .unwrap();

        assert_eq!(artifact.breach_count, 0);
        assert!(artifact.content.starts_with(b"%PDF"));
        // Summary page plus recommendations page
        assert_eq!(page_count(&artifact), 2);
    }

    #[test]
    fn test_render_many_sources_breaks_pages() {
        let report = BreachReport {
            match_count: 80,
            sources: (0..80).map(|i| source(&format!("Breach {i}"))).collect(),
        };
        let artifact = PdfRenderer::new().render("customer@example.com", &report).unwrap();

        assert_eq!(artifact.breach_count, 80);
        assert!(page_count(&artifact) > 3, "80 entries should spill over several pages");
    }

    #[test]
    fn test_render_carries_breach_count() {
        let report = BreachReport {
            match_count: 2,
            sources: vec![source("A"), source("B")],
        };
        let artifact = PdfRenderer::new().render("customer@example.com", &report).unwrap();
        assert_eq!(artifact.breach_count, 2);
    }

    #[test]
    fn test_render_handles_awkward_text() {
        // Parentheses and backslashes must survive PDF string escaping
        let report = BreachReport {
            match_count: 1,
            sources: vec![BreachSource {
                name: Some("Weird (Name) \\ Co".to_string()),
                date: None,
                exposed_fields: vec![],
            }],
        };
        let artifact = PdfRenderer::new().render("we(ird)@example.com", &report).unwrap();
        assert!(Document::load_mem(&artifact.content).is_ok());
    }
}
