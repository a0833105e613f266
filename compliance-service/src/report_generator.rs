//! AML Check Report Generator
//!
//! Renders the outcome of one address check as a single-page PDF:
//! - Address and currency under review
//! - Risk score, colour-coded risk level and categories
//! - Sanctions screening result with identifications
//! - Check reference and generation time

use crate::error::{ComplianceError, Result};
use crate::types::SanctionsResult;
use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Rect, Rgb};
use risk_engine::{RiskLevel, RiskScore};
use serde::{Deserialize, Serialize};

/// Smallest document accepted as a real report
pub const MIN_REPORT_SIZE: usize = 1024;

const MAX_URL_LEN: usize = 80;

// A4 in points, origin bottom-left
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;

/// Report format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &str {
        match self {
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            ReportFormat::Pdf => "application/pdf",
        }
    }

    /// Storage key of the report for a check; stable across re-renders
    pub fn key_for(&self, check_id: &str) -> String {
        format!("{}.{}", check_id, self.extension())
    }
}

/// Everything that goes on a check report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub check_id: String,
    pub address: String,
    pub currency: String,
    pub risk_score: RiskScore,
    pub risk_level: RiskLevel,
    pub categories: Vec<String>,
    pub sanctions: SanctionsResult,
    pub generated_at: DateTime<Utc>,
}

/// Report generator configuration
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub title: String,
    pub issuer: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "AML Address Check Report".to_string(),
            issuer: "AML Gateway".to_string(),
        }
    }
}

/// Check report generator
#[derive(Debug, Clone, Default)]
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    /// Render and validate a report
    pub fn render(&self, report: &CheckReport) -> Result<Vec<u8>> {
        if report.check_id.is_empty() {
            return Err(ComplianceError::ReportGeneration(
                "check id is required".to_string(),
            ));
        }

        let bytes = draw(&self.config.title, &self.layout(report))?;
        validate_pdf(&bytes)?;
        Ok(bytes)
    }

    /// Page content, top to bottom
    fn layout(&self, report: &CheckReport) -> Vec<Element> {
        let mut page = Page::default();
        let mut y = 780.0;

        // Header band
        page.rect(0.0, 812.0, PAGE_WIDTH, PAGE_HEIGHT, Shade::BAND);
        page.text(MARGIN, 822.0, Weight::Bold, 11.0, Shade::WHITE, &self.config.issuer);

        page.text(MARGIN, y, Weight::Bold, 20.0, Shade::BLACK, &self.config.title);
        y -= 20.0;
        page.text(
            MARGIN,
            y,
            Weight::Regular,
            10.0,
            Shade::GRAY,
            &format!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        );
        y -= 14.0;
        page.line(MARGIN, PAGE_WIDTH - MARGIN, y, 1.0);
        y -= 28.0;

        y = page.field(y, "Address:", &report.address);
        y = page.field(y, "Currency:", &report.currency);
        y -= 14.0;

        page.text(MARGIN, y, Weight::Bold, 14.0, Shade::BLACK, "Risk Assessment");
        y -= 22.0;
        y = page.field(y, "Risk Score:", &format!("{} / 100", report.risk_score.score()));
        page.text(MARGIN, y, Weight::Bold, 11.0, Shade::BLACK, "Risk Level:");
        page.text(
            MARGIN + 110.0,
            y,
            Weight::Bold,
            11.0,
            level_shade(report.risk_level),
            report.risk_level.as_str(),
        );
        y -= 18.0;
        let categories = if report.categories.is_empty() {
            "None".to_string()
        } else {
            report.categories.join(", ")
        };
        y = page.field(y, "Categories:", &categories);
        y -= 14.0;

        page.text(MARGIN, y, Weight::Bold, 14.0, Shade::BLACK, "Sanctions Screening");
        y -= 22.0;
        if report.sanctions.hit {
            page.text(
                MARGIN,
                y,
                Weight::Bold,
                11.0,
                Shade::RED,
                &format!(
                    "SANCTIONS HIT ({} identification(s))",
                    report.sanctions.identifications.len()
                ),
            );
            y -= 18.0;
            for identification in &report.sanctions.identifications {
                if y < 120.0 {
                    page.text(MARGIN, y, Weight::Regular, 10.0, Shade::GRAY, "...");
                    break;
                }
                page.text(
                    MARGIN + 10.0,
                    y,
                    Weight::Regular,
                    10.0,
                    Shade::BLACK,
                    &format!("- {}: {}", identification.category, identification.name),
                );
                y -= 14.0;
                if !identification.url.is_empty() {
                    page.text(
                        MARGIN + 20.0,
                        y,
                        Weight::Regular,
                        9.0,
                        Shade::GRAY,
                        &truncate(&identification.url, MAX_URL_LEN),
                    );
                    y -= 14.0;
                }
            }
        } else {
            page.text(MARGIN, y, Weight::Regular, 11.0, Shade::GREEN, "No sanctions detected");
        }

        page.line(MARGIN, PAGE_WIDTH - MARGIN, 90.0, 0.5);
        let footer = [
            format!("Check ID: {}", report.check_id),
            "This report reflects provider data available at the time of generation".to_string(),
            "and does not constitute legal advice.".to_string(),
        ];
        for (i, text) in footer.iter().enumerate() {
            page.text(MARGIN, 76.0 - 12.0 * i as f32, Weight::Regular, 8.0, Shade::GRAY, text);
        }

        page.elements
    }
}

/// Reject anything too small or lacking the PDF signature
pub fn validate_pdf(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_REPORT_SIZE {
        return Err(ComplianceError::InvalidReport(format!(
            "document too small: {} bytes",
            bytes.len()
        )));
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(ComplianceError::InvalidReport(
            "missing PDF signature".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Weight {
    Regular,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shade(f32, f32, f32);

impl Shade {
    const BLACK: Shade = Shade(0.0, 0.0, 0.0);
    const WHITE: Shade = Shade(1.0, 1.0, 1.0);
    const GRAY: Shade = Shade(0.4, 0.4, 0.4);
    const GREEN: Shade = Shade(0.13, 0.55, 0.13);
    const RED: Shade = Shade(0.8, 0.0, 0.0);
    const BAND: Shade = Shade(0.11, 0.20, 0.36);

    fn color(self) -> Color {
        Color::Rgb(Rgb::new(self.0, self.1, self.2, None))
    }
}

/// One drawing operation in points
#[derive(Debug, Clone, PartialEq)]
enum Element {
    Text {
        x: f32,
        y: f32,
        weight: Weight,
        size: f32,
        shade: Shade,
        text: String,
    },
    Line {
        x1: f32,
        x2: f32,
        y: f32,
        width: f32,
    },
    Rect {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        shade: Shade,
    },
}

#[derive(Default)]
struct Page {
    elements: Vec<Element>,
}

impl Page {
    fn text(&mut self, x: f32, y: f32, weight: Weight, size: f32, shade: Shade, text: &str) {
        self.elements.push(Element::Text {
            x,
            y,
            weight,
            size,
            shade,
            text: text.to_string(),
        });
    }

    fn line(&mut self, x1: f32, x2: f32, y: f32, width: f32) {
        self.elements.push(Element::Line { x1, x2, y, width });
    }

    fn rect(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, shade: Shade) {
        self.elements.push(Element::Rect { x1, y1, x2, y2, shade });
    }

    fn field(&mut self, y: f32, label: &str, value: &str) -> f32 {
        self.text(MARGIN, y, Weight::Bold, 11.0, Shade::BLACK, label);
        self.text(MARGIN + 110.0, y, Weight::Regular, 11.0, Shade::BLACK, value);
        y - 18.0
    }
}

fn mm(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

fn pdf_error(e: printpdf::Error) -> ComplianceError {
    ComplianceError::ReportGeneration(format!("{:?}", e))
}

/// Paint the elements on a single A4 page with the built-in Helvetica faces
fn draw(title: &str, elements: &[Element]) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Report");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    for element in elements {
        paint(&layer, element, &regular, &bold);
    }

    doc.save_to_bytes().map_err(pdf_error)
}

fn paint(layer: &PdfLayerReference, element: &Element, regular: &IndirectFontRef, bold: &IndirectFontRef) {
    match element {
        Element::Text {
            x,
            y,
            weight,
            size,
            shade,
            text,
        } => {
            let font = match weight {
                Weight::Regular => regular,
                Weight::Bold => bold,
            };
            layer.set_fill_color(shade.color());
            layer.use_text(text.as_str(), *size, mm(*x), mm(*y), font);
        }
        Element::Line { x1, x2, y, width } => {
            layer.set_outline_color(Shade::GRAY.color());
            layer.set_outline_thickness(*width);
            layer.add_line(Line {
                points: vec![
                    (Point::new(mm(*x1), mm(*y)), false),
                    (Point::new(mm(*x2), mm(*y)), false),
                ],
                is_closed: false,
            });
        }
        Element::Rect { x1, y1, x2, y2, shade } => {
            layer.set_fill_color(shade.color());
            layer.add_rect(Rect::new(mm(*x1), mm(*y1), mm(*x2), mm(*y2)));
        }
    }
}

fn level_shade(level: RiskLevel) -> Shade {
    match level {
        RiskLevel::Low => Shade::GREEN,
        RiskLevel::Medium => Shade(0.85, 0.60, 0.0),
        RiskLevel::High => Shade(0.85, 0.33, 0.10),
        RiskLevel::Critical => Shade::RED,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SanctionsIdentification;

    fn report(sanctions: SanctionsResult) -> CheckReport {
        CheckReport {
            check_id: "0b9e5c1e-6f43-4c1e-9d1e-3f0c2b7a9f10".to_string(),
            address: "0x742d35cc6634c0532925a3b844bc454e4438f44e".to_string(),
            currency: "ETH".to_string(),
            risk_score: RiskScore::new(85),
            risk_level: RiskLevel::Critical,
            categories: vec!["Darknet".to_string(), "Mixer".to_string()],
            sanctions,
            generated_at: Utc::now(),
        }
    }

    fn texts(elements: &[Element]) -> Vec<String> {
        elements
            .iter()
            .filter_map(|e| match e {
                Element::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_renders_valid_pdf() {
        let bytes = ReportGenerator::default()
            .render(&report(SanctionsResult::clear()))
            .unwrap();

        assert!(bytes.len() >= MIN_REPORT_SIZE);
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_layout_content() {
        let generator = ReportGenerator::default();
        let elements = generator.layout(&report(SanctionsResult::clear()));
        let texts = texts(&elements);

        assert!(texts.contains(&"85 / 100".to_string()));
        assert!(texts.contains(&"Darknet, Mixer".to_string()));
        assert!(texts.contains(&"No sanctions detected".to_string()));
        assert!(elements.iter().any(|e| matches!(
            e,
            Element::Text { text, shade, .. } if text == "Critical" && *shade == Shade::RED
        )));
    }

    #[test]
    fn test_layout_identifications() {
        let long_url = format!("https://example.org/{}", "x".repeat(120));
        let sanctions = SanctionsResult::from_identifications(vec![SanctionsIdentification {
            category: "sanctions".to_string(),
            name: "OFAC SDN Entity".to_string(),
            description: String::new(),
            url: long_url,
        }]);

        let texts = texts(&ReportGenerator::default().layout(&report(sanctions.clone())));

        assert!(texts.iter().any(|t| t.starts_with("SANCTIONS HIT")));
        assert!(texts.contains(&"- sanctions: OFAC SDN Entity".to_string()));
        assert!(!texts.iter().any(|t| t.contains(&"x".repeat(100))));

        assert!(ReportGenerator::default().render(&report(sanctions)).is_ok());
    }

    #[test]
    fn test_empty_categories() {
        let mut report = report(SanctionsResult::clear());
        report.categories.clear();
        let texts = texts(&ReportGenerator::default().layout(&report));
        assert!(texts.contains(&"None".to_string()));
    }

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf(b"%PDF-1.4").is_err());
        assert!(validate_pdf(&vec![b'a'; 2048]).is_err());

        let mut ok = b"%PDF-1.4\n".to_vec();
        ok.resize(MIN_REPORT_SIZE, b' ');
        assert!(validate_pdf(&ok).is_ok());
    }

    #[test]
    fn test_report_key() {
        assert_eq!(ReportFormat::Pdf.key_for("abc"), "abc.pdf");
        assert_eq!(ReportFormat::Pdf.mime_type(), "application/pdf");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 80), "short");
        assert_eq!(truncate(&"y".repeat(90), 80).chars().count(), 80);
    }
}
