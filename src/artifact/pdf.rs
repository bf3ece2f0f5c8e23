//! PDF health report with physician details and a verification QR code.
//!
//! Layout: title block, patient table, medical table, attending physician
//! table, verification code, confidentiality footer. Tables flow onto a new
//! A4 page when the current one is full.

use std::io::BufWriter;
use std::sync::Arc;

use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use qrcode::{EcLevel, QrCode};

use super::{Artifact, ArtifactError, ArtifactGenerator};
use crate::config::ArtifactConfig;
use crate::directory::DoctorDirectory;
use crate::models::{Doctor, HealthRecord};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;
const LINE_HEIGHT: f32 = 4.5;
const VALUE_WRAP_CHARS: usize = 60;
const QR_SIZE_MM: f32 = 40.0;
const QR_QUIET_MODULES: usize = 2;
const FOOTER: &str = "CONFIDENTIAL DOCUMENT - UNAUTHORIZED ACCESS PROHIBITED";

fn navy() -> Color {
    Color::Rgb(Rgb::new(0.0, 0.2, 0.4, None))
}

fn grey() -> Color {
    Color::Rgb(Rgb::new(0.4, 0.4, 0.4, None))
}

fn ink() -> Color {
    Color::Rgb(Rgb::new(0.1, 0.1, 0.1, None))
}

fn crimson() -> Color {
    Color::Rgb(Rgb::new(0.6, 0.0, 0.0, None))
}

/// Renders health reports, enriching the physician section from the
/// doctor directory.
pub struct PdfArtifactGenerator {
    directory: Arc<dyn DoctorDirectory>,
    hospital_name: String,
    verification_url: String,
}

impl PdfArtifactGenerator {
    pub fn new(directory: Arc<dyn DoctorDirectory>, config: &ArtifactConfig) -> Self {
        Self {
            directory,
            hospital_name: config.hospital_name.clone(),
            verification_url: config.verification_url.clone(),
        }
    }

    fn lookup_doctor(&self, doctor_id: &str) -> Option<Doctor> {
        if doctor_id.is_empty() {
            return None;
        }
        match self.directory.find(doctor_id) {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(doctor_id, error = %e, "Doctor lookup failed, using record name");
                None
            }
        }
    }

    fn verification_link(&self, patient_id: &str, document_id: &str) -> String {
        format!(
            "{}?patientId={}&docId={}",
            self.verification_url, patient_id, document_id
        )
    }
}

impl ArtifactGenerator for PdfArtifactGenerator {
    fn generate(&self, record: &HealthRecord) -> Result<Artifact, ArtifactError> {
        let document_id = format!("EHR-{}", chrono::Utc::now().timestamp_millis());
        let verification_url = self.verification_link(&record.patient_id, &document_id);
        let doctor = self.lookup_doctor(&record.doctor_id);

        let mut page = PageWriter::new(&format!("Health Record {}", record.patient_id))?;

        // Title block
        page.centered(&self.hospital_name, 20.0, true, navy());
        page.y -= 8.0;
        page.centered("Electronic Health Record System", 14.0, false, grey());
        page.y -= 10.0;
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        page.text(&format!("Generated: {generated}"), 10.0, MARGIN, false, grey());
        page.text(
            &format!("Document ID: {document_id}"),
            10.0,
            PAGE_WIDTH - MARGIN - 60.0,
            false,
            grey(),
        );
        page.y -= 6.0;
        page.rule();
        page.y -= 8.0;

        page.section("PATIENT INFORMATION");
        page.table(("Field", "Details"), &patient_rows(record));

        page.section("MEDICAL DETAILS");
        page.table(("Category", "Information"), &medical_rows(record));

        page.section("ATTENDING PHYSICIAN");
        page.table(("Detail", "Information"), &physician_rows(record, doctor.as_ref()));

        page.verification(&verification_url);
        page.footer();

        let bytes = page.finish()?;
        tracing::debug!(
            patient_id = record.patient_id.as_str(),
            document_id = document_id.as_str(),
            size = bytes.len(),
            "Health report rendered"
        );

        Ok(Artifact {
            patient_id: record.patient_id.clone(),
            document_id,
            verification_url,
            bytes,
        })
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn patient_rows(record: &HealthRecord) -> Vec<(String, String)> {
    vec![
        ("Patient ID".into(), record.patient_id.clone()),
        ("Full Name".into(), record.name.clone()),
        (
            "Age/Gender".into(),
            format!(
                "{} / {}",
                or_default(&record.age, "N/A"),
                or_default(&record.gender, "N/A")
            ),
        ),
        (
            "Contact".into(),
            format!(
                "{}\n{}",
                or_default(&record.phone_number, "N/A"),
                or_default(&record.email, "N/A")
            ),
        ),
    ]
}

fn medical_rows(record: &HealthRecord) -> Vec<(String, String)> {
    vec![
        ("Primary Diagnosis".into(), or_default(&record.diagnosis, "Not specified")),
        ("Symptoms".into(), or_default(&record.symptoms, "Not specified")),
        ("Treatment Plan".into(), or_default(&record.treatment_plan, "Not specified")),
        ("Medications".into(), or_default(&record.medications, "Not specified")),
        ("Allergies".into(), or_default(&record.allergies, "None reported")),
        (
            "Last Consultation".into(),
            chrono::Local::now().format("%Y-%m-%d").to_string(),
        ),
    ]
}

fn opt_or_default(value: &Option<String>, fallback: &str) -> String {
    or_default(value.as_deref().unwrap_or_default(), fallback)
}

fn physician_rows(record: &HealthRecord, doctor: Option<&Doctor>) -> Vec<(String, String)> {
    match doctor {
        Some(d) => vec![
            ("Name".into(), d.name.clone()),
            ("ID".into(), d.doctor_id.clone()),
            ("Department".into(), opt_or_default(&d.department, "Not specified")),
            ("Specialization".into(), opt_or_default(&d.specialization, "Not specified")),
            ("Experience".into(), opt_or_default(&d.experience, "Not specified")),
            ("Contact".into(), opt_or_default(&d.phone_number, "Not provided")),
            ("Email".into(), or_default(&d.email, "Not provided")),
        ],
        None => vec![
            ("Name".into(), or_default(&record.doctor_name, "Not specified")),
            ("Note".into(), "Doctor details not found in system.".into()),
        ],
    }
}

/// Greedy word wrap on character count.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let projected = current.chars().count() + 1 + word.chars().count();
            if !current.is_empty() && projected > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

// ─── Page writer ──────────────────────────────────────────────────────────────

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    /// Baseline of the next line, in mm from the page bottom.
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ArtifactError> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ArtifactError::Font(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ArtifactError::Font(e.to_string()))?;

        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: PAGE_HEIGHT - MARGIN - 6.0,
            pages: 1,
        })
    }

    fn ensure_space(&mut self, needed_mm: f32) {
        if self.y - needed_mm > MARGIN + 10.0 {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Layer {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn text(&self, text: &str, size: f32, x: f32, bold: bool, color: Color) {
        self.layer.set_fill_color(color);
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    /// Approximate centring for the built-in Helvetica metrics.
    fn centered(&self, text: &str, size: f32, bold: bool, color: Color) {
        let approx_width = text.chars().count() as f32 * size * 0.5 * 0.3528;
        let x = ((PAGE_WIDTH - approx_width) / 2.0).max(MARGIN);
        self.text(text, size, x, bold, color);
    }

    fn line(&self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.layer.set_outline_color(Color::Rgb(Rgb::new(0.8, 0.8, 0.8, None)));
        self.layer.set_outline_thickness(0.5);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x1), Mm(y1)), false),
                (Point::new(Mm(x2), Mm(y2)), false),
            ],
            is_closed: false,
        });
    }

    fn rule(&self) {
        self.line(MARGIN, self.y, PAGE_WIDTH - MARGIN, self.y);
    }

    fn section(&mut self, heading: &str) {
        self.ensure_space(30.0);
        self.text(heading, 14.0, MARGIN, true, ink());
        self.y -= 8.0;
    }

    fn table(&mut self, headers: (&str, &str), rows: &[(String, String)]) {
        let left = MARGIN;
        let right = PAGE_WIDTH - MARGIN;
        let split = left + (right - left) / 2.0;

        self.text(headers.0, 10.0, left + 2.0, true, navy());
        self.text(headers.1, 10.0, split + 2.0, true, navy());
        self.y -= 2.5;
        self.line(left, self.y, right, self.y);

        for (label, value) in rows {
            let lines = wrap_text(value, VALUE_WRAP_CHARS);
            let row_height = lines.len().max(1) as f32 * LINE_HEIGHT + 2.5;
            self.ensure_space(row_height);

            let top = self.y;
            self.y -= LINE_HEIGHT;
            self.text(label, 10.0, left + 2.0, false, ink());
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    self.y -= LINE_HEIGHT;
                }
                self.text(line, 10.0, split + 2.0, false, ink());
            }
            self.y = top - row_height;
            self.line(left, self.y, right, self.y);
            self.line(left, top, left, self.y);
            self.line(split, top, split, self.y);
            self.line(right, top, right, self.y);
        }
        self.y -= 10.0;
    }

    fn verification(&mut self, url: &str) {
        self.ensure_space(QR_SIZE_MM + 20.0);
        self.centered("DOCUMENT VERIFICATION", 14.0, true, navy());
        self.y -= 4.0;

        match QrCode::with_error_correction_level(url.as_bytes(), EcLevel::H) {
            Ok(code) => {
                let x = (PAGE_WIDTH - QR_SIZE_MM) / 2.0;
                self.draw_qr(&code, x, self.y);
                self.y -= QR_SIZE_MM + 6.0;
                self.centered("Scan to verify document authenticity", 10.0, false, grey());
            }
            Err(e) => {
                tracing::error!(error = %e, "QR code generation failed");
                self.y -= 6.0;
                self.centered("Verification QR code could not be generated", 10.0, false, grey());
            }
        }
        self.y -= 10.0;
    }

    /// Draw dark modules as filled rectangles, merging horizontal runs.
    fn draw_qr(&self, code: &QrCode, x: f32, top: f32) {
        let width = code.width();
        let module = QR_SIZE_MM / (width + 2 * QR_QUIET_MODULES) as f32;
        let colors = code.to_colors();
        self.layer.set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));

        for row in 0..width {
            let mut col = 0;
            while col < width {
                if colors[row * width + col] != qrcode::Color::Dark {
                    col += 1;
                    continue;
                }
                let start = col;
                while col < width && colors[row * width + col] == qrcode::Color::Dark {
                    col += 1;
                }
                let x1 = x + (start + QR_QUIET_MODULES) as f32 * module;
                let x2 = x + (col + QR_QUIET_MODULES) as f32 * module;
                let y1 = top - (row + QR_QUIET_MODULES) as f32 * module;
                let y2 = y1 - module;
                self.layer.add_polygon(Polygon {
                    rings: vec![vec![
                        (Point::new(Mm(x1), Mm(y1)), false),
                        (Point::new(Mm(x2), Mm(y1)), false),
                        (Point::new(Mm(x2), Mm(y2)), false),
                        (Point::new(Mm(x1), Mm(y2)), false),
                    ]],
                    mode: PaintMode::Fill,
                    winding_order: WindingOrder::NonZero,
                });
            }
        }
    }

    fn footer(&mut self) {
        self.y = MARGIN;
        self.centered(FOOTER, 9.0, false, crimson());
    }

    fn finish(self) -> Result<Vec<u8>, ArtifactError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ArtifactError::Render(e.to_string()))?;
        buf.into_inner()
            .map_err(|e| ArtifactError::Render(format!("PDF buffer error: {e}")))
    }
}
